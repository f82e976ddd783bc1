//! Drawing strategies for eye overlays.
//!
//! An [`Overlay`] draws a single [`EyeDescriptor`] onto the render surface. Two strategies exist:
//! [`LensOverlay`] composites a product texture onto the iris, [`DotOverlay`] just covers each
//! iris with a filled circle and needs no texture. [`OverlayStyle`] selects one of them.

use std::{fmt, str::FromStr};

use anyhow::bail;

use crate::{
    eye::EyeDescriptor,
    image::{draw, BlendMode, Clip, Color, Image, Rect},
    texture::Texture,
};

/// Draws eye overlays onto a surface.
pub trait Overlay {
    /// Returns whether [`Overlay::draw`] needs a decoded texture to draw anything.
    fn needs_texture(&self) -> bool;

    /// Returns whether the overlay cares about eye closure.
    ///
    /// If not, the pipeline won't compute closure state or eyelid bounding boxes.
    fn tracks_closure(&self) -> bool;

    /// Draws the overlay for one eye.
    ///
    /// Overlays that need a texture draw nothing when `texture` is [`None`].
    fn draw(&self, surface: &mut Image, eye: &EyeDescriptor, texture: Option<&Texture>);
}

/// Selects which [`Overlay`] to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayStyle {
    /// Translucent texture composited onto the iris ([`LensOverlay`]).
    #[default]
    Lens,
    /// Filled circles over each iris ([`DotOverlay`]).
    Dots,
}

impl OverlayStyle {
    /// Creates the overlay with its default parameters.
    pub fn create(self) -> Box<dyn Overlay> {
        match self {
            OverlayStyle::Lens => Box::new(LensOverlay::new()),
            OverlayStyle::Dots => Box::new(DotOverlay::new()),
        }
    }
}

impl FromStr for OverlayStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lens" => Ok(Self::Lens),
            "dots" => Ok(Self::Dots),
            _ => bail!("invalid overlay style '{s}' (expected 'lens' or 'dots')"),
        }
    }
}

impl fmt::Display for OverlayStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverlayStyle::Lens => "lens",
            OverlayStyle::Dots => "dots",
        })
    }
}

/// Composites a texture onto the iris, darkening what is underneath.
///
/// The texture is stretched over a square centered on the iris. For open eyes, it is clipped to
/// a circle slightly larger than the iris. For closed eyes, it is clipped to the eyelid contour's
/// bounding box instead, while the square stays centered on the iris.
#[derive(Debug, Clone)]
pub struct LensOverlay {
    size_factor: f32,
    clip_factor: f32,
    opacity: f32,
    mode: BlendMode,
}

impl Default for LensOverlay {
    fn default() -> Self {
        Self {
            size_factor: 2.5,
            clip_factor: 1.2,
            opacity: 0.5,
            mode: BlendMode::Darken,
        }
    }
}

impl LensOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the side length of the drawn square, relative to the iris radius.
    pub fn size_factor(self, size_factor: f32) -> Self {
        Self {
            size_factor,
            ..self
        }
    }

    /// Sets the radius of the clip circle for open eyes, relative to the iris radius.
    pub fn clip_factor(self, clip_factor: f32) -> Self {
        Self {
            clip_factor,
            ..self
        }
    }

    pub fn opacity(self, opacity: f32) -> Self {
        Self { opacity, ..self }
    }

    pub fn blend_mode(self, mode: BlendMode) -> Self {
        Self { mode, ..self }
    }

    /// Returns the area the texture is stretched onto.
    pub fn draw_region(&self, eye: &EyeDescriptor) -> Rect {
        let side = eye.radius_px * self.size_factor;
        Rect::from_center(eye.center_x, eye.center_y, side, side)
    }

    /// Returns the shape the texture is clipped to.
    pub fn clip(&self, eye: &EyeDescriptor) -> Clip {
        match eye.bounding_box {
            Some(bbox) if eye.is_closed => Clip::Rect(bbox),
            _ => Clip::Circle {
                x: eye.center_x,
                y: eye.center_y,
                radius: eye.radius_px * self.clip_factor,
            },
        }
    }
}

impl Overlay for LensOverlay {
    fn needs_texture(&self) -> bool {
        true
    }

    fn tracks_closure(&self) -> bool {
        true
    }

    fn draw(&self, surface: &mut Image, eye: &EyeDescriptor, texture: Option<&Texture>) {
        let Some(texture) = texture else {
            return;
        };

        let region = self.draw_region(eye);
        let clip = self.clip(eye);
        log::trace!("lens: {:?} eye in {region:?}, clip {clip:?}", eye.eye);
        surface
            .blend_from(texture.image())
            .region(region)
            .clip(clip)
            .mode(self.mode)
            .opacity(self.opacity);
    }
}

/// Covers each iris with a filled circle.
#[derive(Debug, Clone)]
pub struct DotOverlay {
    color: Color,
    fallback_radius: f32,
}

impl Default for DotOverlay {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            fallback_radius: 8.0,
        }
    }
}

impl DotOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color(self, color: Color) -> Self {
        Self { color, ..self }
    }

    /// Sets the radius used for eyes whose iris radius is unknown, because none of the iris
    /// boundary landmarks were present.
    pub fn fallback_radius(self, fallback_radius: f32) -> Self {
        Self {
            fallback_radius,
            ..self
        }
    }
}

impl Overlay for DotOverlay {
    fn needs_texture(&self) -> bool {
        false
    }

    fn tracks_closure(&self) -> bool {
        false
    }

    fn draw(&self, surface: &mut Image, eye: &EyeDescriptor, _texture: Option<&Texture>) {
        let radius = if eye.iris_points == 0 {
            self.fallback_radius
        } else {
            eye.radius_px
        };
        let diameter = (radius * 2.0).round() as u32;
        draw::circle(
            surface,
            eye.center_x.round() as i32,
            eye.center_y.round() as i32,
            diameter,
        )
        .color(self.color);
    }
}
