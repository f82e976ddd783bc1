//! Utilities for numerics.

use std::cmp::Ordering;

/// An `f32` that implements [`Ord`] according to the IEEE 754 totalOrder predicate.
///
/// Landmark coordinates come from a neural network and are not guaranteed to be finite, so
/// min/max computations over them go through this wrapper instead of `partial_cmp`.
#[derive(Debug, Clone, Copy)]
pub struct TotalF32(pub f32);

impl PartialEq for TotalF32 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TotalF32 {}

impl PartialOrd for TotalF32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF32 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use itertools::{Itertools, MinMaxResult};

    use super::*;

    #[test]
    fn minmax() {
        let values = [3.0, -1.5, 7.25, 0.0].map(TotalF32);
        match values.iter().minmax() {
            MinMaxResult::MinMax(min, max) => {
                assert_eq!(min.0, -1.5);
                assert_eq!(max.0, 7.25);
            }
            _ => unreachable!(),
        }
    }
}
