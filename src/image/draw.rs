//! Primitive drawing, backed by `embedded-graphics`.

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    prelude::*,
    primitives::{self, PrimitiveStyle, Rectangle},
};

use super::{Color, Image};

/// Guard returned by [`circle`]; draws the filled circle when dropped and allows customization.
pub struct DrawCircle<'a> {
    image: &'a mut Image,
    x: i32,
    y: i32,
    diameter: u32,
    color: Color,
}

impl<'a> DrawCircle<'a> {
    /// Sets the circle's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }
}

impl<'a> Drop for DrawCircle<'a> {
    fn drop(&mut self) {
        let circle = primitives::Circle::with_center(Point::new(self.x, self.y), self.diameter);
        let style = PrimitiveStyle::with_fill(self.color);
        match circle.into_styled(style).draw(&mut Target(&mut *self.image)) {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Draws a filled circle centered on `(x, y)` onto an image.
pub fn circle(image: &mut Image, x: i32, y: i32, diameter: u32) -> DrawCircle<'_> {
    DrawCircle {
        image,
        x,
        y,
        diameter,
        color: Color::GREEN,
    }
}

struct Target<'a>(&'a mut Image);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        let (width, height) = (self.0.width(), self.0.height());

        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size { width, height },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0
                && (point.x as u32) < self.0.width()
                && point.y >= 0
                && (point.y as u32) < self.0.height()
            {
                self.0.set(point.x as _, point.y as _, color);
            }
        }

        Ok(())
    }
}
