use std::fmt;

use itertools::{Itertools, MinMaxResult};

use crate::num::TotalF32;

/// An axis-aligned rectangle in pixel coordinates.
///
/// Rectangles are allowed to have zero height and/or width. Negative dimensions are not allowed.
#[derive(Clone, Copy, PartialEq)]
pub struct Rect {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl Rect {
    /// Creates a rectangle extending downwards and right from a point.
    #[inline]
    pub fn from_top_left(top_left_x: f32, top_left_y: f32, width: f32, height: f32) -> Self {
        Self {
            x: top_left_x,
            y: top_left_y,
            width,
            height,
        }
    }

    /// Creates a rectangle extending outwards from a center point.
    #[inline]
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self::from_top_left(
            x_center - width * 0.5,
            y_center - height * 0.5,
            width,
            height,
        )
    }

    /// Computes the (axis-aligned) bounding rectangle that encompasses `points`.
    ///
    /// A single point results in a rectangle of zero width and height.
    ///
    /// Returns [`None`] if `points` is an empty iterator.
    pub fn bounding<I: IntoIterator<Item = (f32, f32)>>(points: I) -> Option<Self> {
        let points = points.into_iter().collect::<Vec<_>>();
        let (x_min, x_max) = min_max(points.iter().map(|&(x, _)| x))?;
        let (y_min, y_max) = min_max(points.iter().map(|&(_, y)| y))?;

        Some(Self::from_top_left(
            x_min,
            y_min,
            x_max - x_min,
            y_max - y_min,
        ))
    }

    /// Returns the X coordinate of the left side of the rectangle.
    #[inline]
    pub fn x(&self) -> f32 {
        self.x
    }

    /// Returns the Y coordinate of the top side of the rectangle.
    #[inline]
    pub fn y(&self) -> f32 {
        self.y
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Returns whether this rectangle covers no area.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Returns whether `(x, y)` lies inside of `self`.
    ///
    /// The left and top edges are inclusive, the right and bottom edges are exclusive.
    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

fn min_max(values: impl Iterator<Item = f32>) -> Option<(f32, f32)> {
    match values.map(TotalF32).minmax() {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some((v.0, v.0)),
        MinMaxResult::MinMax(min, max) => Some((min.0, max.0)),
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect @ ({:.1},{:.1})/{:.1}x{:.1}",
            self.x, self.y, self.width, self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding() {
        assert_eq!(Rect::bounding(Vec::<(f32, f32)>::new()), None);
        assert_eq!(
            Rect::bounding([(3.0, 4.0)]),
            Some(Rect::from_top_left(3.0, 4.0, 0.0, 0.0))
        );
        assert_eq!(
            Rect::bounding([(3.0, 4.0), (-1.0, 10.0), (2.0, 6.0)]),
            Some(Rect::from_top_left(-1.0, 4.0, 4.0, 6.0))
        );
    }

    #[test]
    fn contains_edges() {
        let rect = Rect::from_top_left(1.0, 1.0, 2.0, 2.0);
        assert!(rect.contains(1.0, 1.0));
        assert!(rect.contains(2.5, 2.5));
        assert!(!rect.contains(3.0, 2.0));
        assert!(!rect.contains(2.0, 3.0));
        assert!(!rect.contains(0.5, 2.0));
    }

    #[test]
    fn from_center() {
        let rect = Rect::from_center(10.0, 20.0, 4.0, 6.0);
        assert_eq!(rect, Rect::from_top_left(8.0, 17.0, 4.0, 6.0));
        assert_eq!(rect.center(), (10.0, 20.0));
        assert!(!rect.is_empty());
        assert!(Rect::from_center(10.0, 20.0, 0.0, 6.0).is_empty());
    }
}
