//! Types for representing image resolutions.

use std::fmt;

/// Resolution (`width x height`) of an image, video frame, or render surface.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// Creates a new [`Resolution`] of `width x height`.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the width of this [`Resolution`].
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of this [`Resolution`].
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns whether this resolution contains no pixels at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_pixels() == 0
    }

    /// Maps a normalized coordinate (`0.0..=1.0` on both axes) to pixel coordinates.
    #[inline]
    pub fn denormalize(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.width as f32, y * self.height as f32)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
