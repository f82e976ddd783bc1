//! Detection results produced by a [`FaceLandmarker`](crate::detector::FaceLandmarker).
//!
//! Landmark coordinates are normalized to the video frame: `(0.0, 0.0)` is the top left corner,
//! `(1.0, 1.0)` the bottom right one. Values slightly outside of that range are possible when a
//! face is partially off-screen.

use std::ops::Index;

/// A single landmark, normalized to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
}

impl LandmarkPoint {
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// The ordered landmark list of one face.
///
/// The model decides how many points there are. Consumers must treat an index past the end as
/// "point not present" rather than assuming a fixed mesh size.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    points: Box<[LandmarkPoint]>,
}

impl Landmarks {
    /// Returns the landmark at `index`, or [`None`] if the model didn't produce that many.
    #[inline]
    pub fn get(&self, index: usize) -> Option<LandmarkPoint> {
        self.points.get(index).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = LandmarkPoint> + '_ {
        self.points.iter().copied()
    }
}

impl From<Vec<LandmarkPoint>> for Landmarks {
    fn from(points: Vec<LandmarkPoint>) -> Self {
        Self {
            points: points.into_boxed_slice(),
        }
    }
}

impl FromIterator<LandmarkPoint> for Landmarks {
    fn from_iter<T: IntoIterator<Item = LandmarkPoint>>(iter: T) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

impl Index<usize> for Landmarks {
    type Output = LandmarkPoint;

    #[track_caller]
    fn index(&self, index: usize) -> &LandmarkPoint {
        &self.points[index]
    }
}

/// A named facial expression coefficient, like `eyeCloseL`.
#[derive(Debug, Clone, PartialEq)]
pub struct Blendshape {
    pub name: String,
    /// Expression strength in `0.0..=1.0`.
    pub score: f32,
}

impl Blendshape {
    pub fn new<N: Into<String>>(name: N, score: f32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

/// Everything the model reported about one face.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub landmarks: Landmarks,
    /// Blendshape scores, if the model was asked to produce them.
    pub blendshapes: Option<Vec<Blendshape>>,
}

impl Face {
    pub fn new(landmarks: Landmarks) -> Self {
        Self {
            landmarks,
            blendshapes: None,
        }
    }

    pub fn with_blendshapes(self, blendshapes: Vec<Blendshape>) -> Self {
        Self {
            blendshapes: Some(blendshapes),
            ..self
        }
    }

    /// Returns the score of the blendshape called `name`.
    ///
    /// If the model reports the same name more than once, the first entry is used. Returns
    /// [`None`] if there are no blendshapes or none of them is called `name`.
    pub fn blendshape_score(&self, name: &str) -> Option<f32> {
        self.blendshapes
            .as_ref()?
            .iter()
            .find(|shape| shape.name == name)
            .map(|shape| shape.score)
    }
}

/// The result of running detection on one frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionResult {
    pub faces: Vec<Face>,
}

impl DetectionResult {
    pub fn new(faces: Vec<Face>) -> Self {
        Self { faces }
    }

    /// Returns the first detected face. Any additional faces are ignored by the overlay.
    pub fn first_face(&self) -> Option<&Face> {
        self.faces.first()
    }
}
