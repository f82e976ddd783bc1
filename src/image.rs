//! Image manipulation.
//!
//! This module provides:
//!
//! - The [`Image`] type, an owned RGBA image used both for video frames, decoded textures, and the
//!   overlay render surface.
//! - [`Image::blend_from`], a scaled, clipped blit supporting several [`BlendMode`]s.
//! - A small set of [`draw`] functions for filled and outlined primitives.
//! - [`Rect`], a floating-point rectangle in pixel coordinates.

mod blend;
pub mod draw;
mod rect;


use std::{fmt, ops::Index, path::Path};

use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{ImageBuffer, Rgba, RgbaImage};

use crate::resolution::Resolution;

pub use blend::*;
pub use rect::*;

/// An 8-bit sRGB image with (non-premultiplied) alpha channel.
#[derive(Clone)]
pub struct Image {
    pub(crate) buf: RgbaImage,
}

impl Image {
    /// Creates an empty image of a specified size.
    ///
    /// The image will start out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Decodes an encoded image (PNG, JPEG or GIF) from a byte slice.
    ///
    /// The format is detected from the data itself, not from any file name.
    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        let buf = image::load_from_memory(data)?.to_rgba8();
        log::trace!("decoded {}x{} image", buf.width(), buf.height());
        Ok(Self { buf })
    }

    /// Saves an image to the file system.
    ///
    /// The encoding is chosen based on the path's file extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        Ok(self.buf.save(path.as_ref())?)
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns a [`Rect`] covering this image.
    ///
    /// The rectangle will be positioned at `(0, 0)` and have the width and height of the image.
    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0.0, 0.0, self.width() as f32, self.height() as f32)
    }

    /// Gets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Sets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf[(x, y)] = Rgba(color.0);
    }

    /// Clears the image, setting every pixel value to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }

    /// Changes the size of this image to `res`.
    ///
    /// Like resizing a canvas, this discards the previous contents: afterwards, every pixel is
    /// [`Color::NULL`]. Returns `false` (and leaves the image untouched) if the image already has
    /// the requested size.
    pub fn resize_to(&mut self, res: Resolution) -> bool {
        if self.resolution() == res {
            return false;
        }

        log::debug!("resizing surface from {} to {}", self.resolution(), res);
        self.buf = ImageBuffer::new(res.width(), res.height());
        true
    }

    /// Returns the number of pixels for which `pred` returns `true`.
    pub fn count_pixels(&self, mut pred: impl FnMut(Color) -> bool) -> usize {
        self.buf.pixels().filter(|pix| pred(Color(pix.0))).count()
    }

    /// Blends `src` onto `self`, stretching or shrinking `src` as necessary.
    ///
    /// By default, the *entire* `src` is blended onto the *entire* destination using alpha
    /// blending. The returned [`Blend`] can be used to pick a destination region, a clip shape, a
    /// blend mode and an opacity; the operation is performed when it is dropped.
    pub fn blend_from<'a>(&'a mut self, src: &'a Image) -> Blend<'a> {
        Blend::new(self, src)
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}

/// An 8-bit RGBA color.
///
/// Colors are always in the sRGB color space and use non-premultiplied alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// Fully transparent black (all components are 0).
    pub const NULL: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }

    pub fn with_alpha(mut self, a: u8) -> Color {
        self.0[3] = a;
        self
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a(),
        )
    }
}

impl Index<usize> for Color {
    type Output = u8;

    #[inline]
    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}

// FIXME leaks `embedded-graphics` dependency
impl PixelColor for Color {
    type Raw = RawU32;
}
