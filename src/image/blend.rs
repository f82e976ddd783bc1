use std::thread;

use super::{Color, Image, Rect};

/// Describes how to blend pixels together in a [`Blend`] operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// All destination pixels will be overwritten with the corresponding source pixel.
    Overwrite,

    /// Performs alpha blending between source and destination pixels to make the source image
    /// appear in front of the destination image.
    Alpha,

    /// Keeps the darker of source and destination per color channel, then composites the result
    /// over the destination. The destination can only ever get darker where it is opaque.
    Darken,
}

/// Restricts which destination pixels a [`Blend`] may touch.
///
/// A pixel is inside the clip shape if its *center* is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Clip {
    /// No restriction beyond the destination region.
    None,
    /// Only pixels inside of the rectangle are written.
    Rect(Rect),
    /// Only pixels inside of the circle are written.
    Circle { x: f32, y: f32, radius: f32 },
}

impl Clip {
    /// Returns whether the point `(x, y)` lies inside the clip shape.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        match *self {
            Clip::None => true,
            Clip::Rect(rect) => rect.contains(x, y),
            Clip::Circle {
                x: cx,
                y: cy,
                radius,
            } => {
                let (dx, dy) = (x - cx, y - cy);
                dx * dx + dy * dy <= radius * radius
            }
        }
    }
}

/// A blending operation between two images.
///
/// Returned by [`Image::blend_from`]. The operation is performed when this is dropped.
pub struct Blend<'a> {
    dest: &'a mut Image,
    src: &'a Image,
    region: Rect,
    clip: Clip,
    mode: BlendMode,
    opacity: f32,
}

impl<'a> Blend<'a> {
    pub(super) fn new(dest: &'a mut Image, src: &'a Image) -> Self {
        Self {
            region: dest.rect(),
            dest,
            src,
            clip: Clip::None,
            mode: BlendMode::Alpha,
            opacity: 1.0,
        }
    }

    /// Sets the destination area that the whole source image gets stretched onto.
    ///
    /// The region may extend past the destination image, or lie entirely outside of it. By
    /// default, the whole destination image is used.
    pub fn region(&mut self, region: Rect) -> &mut Self {
        self.region = region;
        self
    }

    /// Sets the clip shape to restrict the operation to.
    pub fn clip(&mut self, clip: Clip) -> &mut Self {
        self.clip = clip;
        self
    }

    /// Sets the blend mode to use.
    pub fn mode(&mut self, mode: BlendMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Sets a global opacity factor (`0.0..=1.0`) that the source alpha is multiplied with.
    ///
    /// Has no effect in [`BlendMode::Overwrite`].
    pub fn opacity(&mut self, opacity: f32) -> &mut Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }
}

impl Drop for Blend<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }

        let region = self.region;
        let (src_w, src_h) = (self.src.width(), self.src.height());
        if region.is_empty() || src_w == 0 || src_h == 0 {
            return;
        }

        // Range of destination pixels whose centers might be covered by the region.
        let x_start = region.x().floor().max(0.0) as u32;
        let y_start = region.y().floor().max(0.0) as u32;
        let x_end = (region.x() + region.width())
            .ceil()
            .clamp(0.0, self.dest.width() as f32) as u32;
        let y_end = (region.y() + region.height())
            .ceil()
            .clamp(0.0, self.dest.height() as f32) as u32;

        for dest_y in y_start..y_end {
            for dest_x in x_start..x_end {
                let (px, py) = (dest_x as f32 + 0.5, dest_y as f32 + 0.5);
                if !region.contains(px, py) || !self.clip.contains(px, py) {
                    continue;
                }

                let src_x = ((px - region.x()) / region.width() * src_w as f32) as u32;
                let src_y = ((py - region.y()) / region.height() * src_h as f32) as u32;
                let src_pix = self.src.get(src_x.min(src_w - 1), src_y.min(src_h - 1));
                let dest_pix = self.dest.get(dest_x, dest_y);

                let result = match self.mode {
                    BlendMode::Overwrite => blend_overwrite(dest_pix, src_pix),
                    BlendMode::Alpha => blend_alpha(dest_pix, src_pix, self.opacity),
                    BlendMode::Darken => blend_darken(dest_pix, src_pix, self.opacity),
                };
                self.dest.set(dest_x, dest_y, result);
            }
        }
    }
}

fn blend_overwrite(_dest: Color, src: Color) -> Color {
    src
}

fn blend_alpha(dest: Color, src: Color, opacity: f32) -> Color {
    fn blend_color(dest: f32, src: f32, dest_alpha: f32, src_alpha: f32, result_alpha: f32) -> f32 {
        (src * src_alpha + dest * dest_alpha * (1.0 - src_alpha)) / result_alpha
    }

    let dest = LinearColor::new(dest);
    let mut src = LinearColor::new(src);
    src.0[3] *= opacity;

    let result_alpha = src.a() + dest.a() * (1.0 - src.a());
    if result_alpha <= 0.0 {
        return Color::NULL;
    }
    let r = blend_color(dest.r(), src.r(), dest.a(), src.a(), result_alpha);
    let g = blend_color(dest.g(), src.g(), dest.a(), src.a(), result_alpha);
    let b = blend_color(dest.b(), src.b(), dest.a(), src.a(), result_alpha);

    LinearColor([r, g, b, result_alpha]).to_color()
}

/// Separable "darken" blending followed by source-over compositing.
///
/// Operates on the sRGB-encoded values directly, like 2D canvas compositing does.
fn blend_darken(dest: Color, src: Color, opacity: f32) -> Color {
    let norm = |v: u8| f32::from(v) / 255.0;

    let src_alpha = norm(src.a()) * opacity;
    let dest_alpha = norm(dest.a());
    let result_alpha = src_alpha + dest_alpha * (1.0 - src_alpha);
    if result_alpha <= 0.0 {
        return Color::NULL;
    }

    let channel = |i: usize| {
        let (cs, cb) = (norm(src[i]), norm(dest[i]));
        let mixed = src_alpha * (1.0 - dest_alpha) * cs
            + src_alpha * dest_alpha * cs.min(cb)
            + (1.0 - src_alpha) * dest_alpha * cb;
        to_u8(mixed / result_alpha)
    };

    Color([channel(0), channel(1), channel(2), to_u8(result_alpha)])
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

struct LinearColor([f32; 4]);

impl LinearColor {
    fn new(color: Color) -> Self {
        fn to_rgb(srgb: f32) -> f32 {
            if srgb <= 0.04045 {
                srgb / 12.92
            } else {
                ((srgb + 0.055) / 1.055).powf(2.4)
            }
        }

        let (r, g, b, a) = (color.r(), color.g(), color.b(), color.a());
        let (r, g, b, a) = (f32::from(r), f32::from(g), f32::from(b), f32::from(a));
        let (r, g, b, a) = (r / 255.0, g / 255.0, b / 255.0, a / 255.0);

        let (r, g, b) = (to_rgb(r), to_rgb(g), to_rgb(b));

        Self([r, g, b, a])
    }

    fn to_color(&self) -> Color {
        fn to_srgb(rgb: f32) -> f32 {
            if rgb <= 0.0031308 {
                rgb * 12.92
            } else {
                1.055 * rgb.powf(1.0 / 2.4) - 0.055
            }
        }

        let (r, g, b, a) = (self.r(), self.g(), self.b(), self.a());
        let (r, g, b) = (to_srgb(r), to_srgb(g), to_srgb(b));

        Color([to_u8(r), to_u8(g), to_u8(b), to_u8(a)])
    }

    fn r(&self) -> f32 {
        self.0[0]
    }

    fn g(&self) -> f32 {
        self.0[1]
    }

    fn b(&self) -> f32 {
        self.0[2]
    }

    fn a(&self) -> f32 {
        self.0[3]
    }
}
