//! Eye geometry extraction.
//!
//! Turns one face's landmarks into an [`EyeDescriptor`] per eye: where the iris is on the output
//! surface, how large it is, and whether the eye is closed.

use std::ops::Range;

use crate::{
    image::Rect,
    landmark::{Face, LandmarkPoint},
    resolution::Resolution,
};

/// Blendshape score above which an eye counts as closed.
pub const CLOSURE_THRESHOLD: f32 = 0.3;

/// Identifies an eye.
///
/// "Left" and "right" follow the landmark model's convention, which is from the subject's point
/// of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

/// Landmark indices and blendshape name describing one eye.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EyeIndices {
    /// Landmark at the center of the iris.
    pub center: usize,
    /// Landmarks on the iris boundary.
    pub surround: [usize; 4],
    /// Landmarks on the eyelid contour.
    pub eyelid: Range<usize>,
    /// Blendshape whose score indicates eye closure.
    pub closure_blendshape: &'static str,
}

impl EyeIndices {
    /// The highest landmark index that must be present for the eye to be processed.
    fn max_required(&self) -> usize {
        self.surround.iter().copied().fold(self.center, usize::max)
    }
}

impl Eye {
    pub const ALL: [Eye; 2] = [Eye::Left, Eye::Right];

    /// Returns the landmark indices describing this eye.
    pub fn indices(self) -> EyeIndices {
        match self {
            Eye::Left => EyeIndices {
                center: 468,
                surround: [469, 470, 471, 472],
                eyelid: 33..47,
                closure_blendshape: "eyeCloseL",
            },
            Eye::Right => EyeIndices {
                center: 473,
                surround: [474, 475, 476, 477],
                eyelid: 263..277,
                closure_blendshape: "eyeCloseR",
            },
        }
    }
}

/// Geometry of one eye in output surface pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct EyeDescriptor {
    pub eye: Eye,
    pub center_x: f32,
    pub center_y: f32,
    /// Mean distance from the iris center to the iris boundary landmarks. Never negative.
    pub radius_px: f32,
    /// Number of iris boundary landmarks `radius_px` was averaged over. If this is 0, the radius
    /// is unknown and `radius_px` is 0.
    pub iris_points: usize,
    pub is_closed: bool,
    /// Bounding box of the eyelid contour. Only present for closed eyes.
    pub bounding_box: Option<Rect>,
}

/// The descriptors of both eyes of a face. An eye is [`None`] if its landmarks are missing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EyePair {
    pub left: Option<EyeDescriptor>,
    pub right: Option<EyeDescriptor>,
}

impl EyePair {
    /// Iterates over the present eyes, left first.
    pub fn iter(&self) -> impl Iterator<Item = &EyeDescriptor> + '_ {
        self.left.iter().chain(self.right.iter())
    }

    pub fn get(&self, eye: Eye) -> Option<&EyeDescriptor> {
        match eye {
            Eye::Left => self.left.as_ref(),
            Eye::Right => self.right.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Computes [`EyeDescriptor`]s from landmarks.
#[derive(Debug, Clone)]
pub struct EyeGeometry {
    closure_threshold: f32,
    track_closure: bool,
}

impl Default for EyeGeometry {
    fn default() -> Self {
        Self {
            closure_threshold: CLOSURE_THRESHOLD,
            track_closure: true,
        }
    }
}

impl EyeGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the blendshape score an eye has to exceed to count as closed.
    pub fn closure_threshold(self, closure_threshold: f32) -> Self {
        Self {
            closure_threshold,
            ..self
        }
    }

    /// Sets whether eye closure (and the eyelid bounding box) should be computed at all.
    ///
    /// When disabled, every eye is reported as open.
    pub fn track_closure(self, track_closure: bool) -> Self {
        Self {
            track_closure,
            ..self
        }
    }

    /// Extracts both eyes of `face`, scaled to a surface of size `surface`.
    pub fn extract(&self, face: &Face, surface: Resolution) -> EyePair {
        EyePair {
            left: self.extract_eye(face, surface, Eye::Left),
            right: self.extract_eye(face, surface, Eye::Right),
        }
    }

    /// Extracts a single eye, or returns [`None`] if the face doesn't have enough landmarks.
    pub fn extract_eye(&self, face: &Face, surface: Resolution, eye: Eye) -> Option<EyeDescriptor> {
        let indices = eye.indices();
        let landmarks = &face.landmarks;
        if landmarks.len() <= indices.max_required() {
            log::trace!(
                "{eye:?} eye skipped, only {} landmarks present",
                landmarks.len()
            );
            return None;
        }

        let to_px = |p: LandmarkPoint| surface.denormalize(p.x, p.y);
        let (center_x, center_y) = to_px(landmarks.get(indices.center)?);

        let distances = indices
            .surround
            .iter()
            .filter_map(|&i| landmarks.get(i))
            .map(|p| {
                let (x, y) = to_px(p);
                (x - center_x).hypot(y - center_y)
            })
            .collect::<Vec<_>>();
        let radius_px = if distances.is_empty() {
            0.0
        } else {
            distances.iter().sum::<f32>() / distances.len() as f32
        };

        let is_closed = self.track_closure
            && face
                .blendshape_score(indices.closure_blendshape)
                .map_or(false, |score| score > self.closure_threshold);

        let bounding_box = if is_closed {
            Rect::bounding(
                indices
                    .eyelid
                    .clone()
                    .filter_map(|i| landmarks.get(i))
                    .map(to_px),
            )
        } else {
            None
        };

        Some(EyeDescriptor {
            eye,
            center_x,
            center_y,
            radius_px,
            iris_points: distances.len(),
            is_closed,
            bounding_box,
        })
    }
}
