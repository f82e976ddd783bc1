//! Face landmark detection adapter.
//!
//! The landmark model itself is external to this crate and plugs in through the
//! [`FaceLandmarker`] trait. [`Detector`] wraps one model instance and enforces its lifecycle:
//! it can't be used after it was disposed, and frame timestamps must not go backwards.
//!
//! Loading a model is slow, so [`spawn_initialize`] does it on a background thread and hands
//! out a [`PendingDetector`] that the render loop can poll without blocking.

mod loader;

use std::{fmt, str::FromStr};

use anyhow::bail;

use crate::{image::Image, landmark::DetectionResult, timer::Timer, Error};

pub use loader::{spawn_initialize, InitPoll, PendingDetector};

/// The hosted float16 face landmarker model.
pub const DEFAULT_MODEL_ASSET_PATH: &str = "https://storage.googleapis.com/mediapipe-models/face_landmarker/face_landmarker/float16/latest/face_landmarker.task";

/// An external face landmark model.
pub trait FaceLandmarker: Send {
    /// Runs detection on `frame`, taken at `timestamp_ms` milliseconds.
    ///
    /// Callers guarantee that timestamps never decrease between calls.
    fn detect(&mut self, frame: &Image, timestamp_ms: f64) -> anyhow::Result<DetectionResult>;

    /// Releases all resources held by the model. No other method is called afterwards.
    fn close(&mut self) {}
}

/// Creates [`FaceLandmarker`]s from [`DetectorOptions`].
///
/// This is implemented for all matching closures.
pub trait DetectorFactory: Send + Sync + 'static {
    fn create(&self, options: &DetectorOptions) -> anyhow::Result<Box<dyn FaceLandmarker>>;
}

impl<F> DetectorFactory for F
where
    F: Fn(&DetectorOptions) -> anyhow::Result<Box<dyn FaceLandmarker>> + Send + Sync + 'static,
{
    fn create(&self, options: &DetectorOptions) -> anyhow::Result<Box<dyn FaceLandmarker>> {
        self(options)
    }
}

/// The runtime the landmark model should execute on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delegate {
    #[default]
    Gpu,
    Cpu,
}

impl FromStr for Delegate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpu" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            _ => bail!("invalid delegate '{s}' (expected 'gpu' or 'cpu')"),
        }
    }
}

impl fmt::Display for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Delegate::Gpu => "gpu",
            Delegate::Cpu => "cpu",
        })
    }
}

/// Options passed to the [`DetectorFactory`].
///
/// The defaults are the production configuration: the hosted float16 model on the GPU, with
/// blendshapes enabled and a single face.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorOptions {
    model_asset_path: String,
    delegate: Delegate,
    output_blendshapes: bool,
    num_faces: u32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            model_asset_path: DEFAULT_MODEL_ASSET_PATH.into(),
            delegate: Delegate::Gpu,
            output_blendshapes: true,
            num_faces: 1,
        }
    }
}

impl DetectorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the URL or path of the model asset to load.
    pub fn model_asset_path<P: Into<String>>(self, path: P) -> Self {
        Self {
            model_asset_path: path.into(),
            ..self
        }
    }

    pub fn delegate(self, delegate: Delegate) -> Self {
        Self { delegate, ..self }
    }

    /// Sets whether the model should report blendshape scores.
    ///
    /// Eye closure tracking needs them. Without blendshapes, eyes are always considered open.
    pub fn output_blendshapes(self, output_blendshapes: bool) -> Self {
        Self {
            output_blendshapes,
            ..self
        }
    }

    /// Sets the maximum number of faces to detect. Only the first one is ever used.
    pub fn num_faces(self, num_faces: u32) -> Self {
        Self { num_faces, ..self }
    }

    pub fn get_model_asset_path(&self) -> &str {
        &self.model_asset_path
    }

    pub fn get_delegate(&self) -> Delegate {
        self.delegate
    }

    pub fn get_output_blendshapes(&self) -> bool {
        self.output_blendshapes
    }

    pub fn get_num_faces(&self) -> u32 {
        self.num_faces
    }
}

/// An initialized landmark model.
///
/// Dropping a [`Detector`] disposes it.
pub struct Detector {
    inner: Option<Box<dyn FaceLandmarker>>,
    options: DetectorOptions,
    last_timestamp: Option<f64>,
    t_detect: Timer,
}

impl Detector {
    /// Creates a landmark model via `factory`, blocking until it is loaded.
    ///
    /// Use [`spawn_initialize`] to do this in the background instead.
    pub fn initialize(
        options: DetectorOptions,
        factory: &dyn DetectorFactory,
    ) -> Result<Self, Error> {
        log::debug!(
            "creating face landmarker (model={}, delegate={}, blendshapes={}, faces={})",
            options.model_asset_path,
            options.delegate,
            options.output_blendshapes,
            options.num_faces,
        );
        let inner = factory.create(&options).map_err(Error::InitFailure)?;
        Ok(Self {
            inner: Some(inner),
            options,
            last_timestamp: None,
            t_detect: Timer::new("detect"),
        })
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }

    /// Runs the landmark model on `frame`.
    ///
    /// `timestamp_ms` must not be smaller than the timestamp of the previous call, or
    /// [`Error::TimestampRegression`] is returned without invoking the model.
    pub fn detect(&mut self, frame: &Image, timestamp_ms: f64) -> Result<DetectionResult, Error> {
        let Some(inner) = &mut self.inner else {
            return Err(Error::UseAfterDispose);
        };
        if let Some(previous) = self.last_timestamp {
            if timestamp_ms < previous {
                return Err(Error::TimestampRegression {
                    previous,
                    current: timestamp_ms,
                });
            }
        }
        self.last_timestamp = Some(timestamp_ms);

        let result = self
            .t_detect
            .time(|| inner.detect(frame, timestamp_ms))
            .map_err(Error::Detection)?;
        log::trace!("detected {} face(s) at {timestamp_ms}ms", result.faces.len());
        Ok(result)
    }

    /// Releases the underlying model. Calling this more than once has no effect.
    pub fn dispose(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            log::debug!("disposing face landmarker");
            inner.close();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_none()
    }

    /// Returns the profiling timer for model invocations.
    pub fn timers(&self) -> impl IntoIterator<Item = &Timer> + '_ {
        [&self.t_detect]
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detector")
            .field("options", &self.options)
            .field("disposed", &self.is_disposed())
            .field("last_timestamp", &self.last_timestamp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::test::{failing_factory, synthetic_face, Script};

    use super::*;

    fn frame() -> Image {
        Image::new(4, 4)
    }

    #[test]
    fn default_options() {
        let options = DetectorOptions::default();
        assert_eq!(options.get_model_asset_path(), DEFAULT_MODEL_ASSET_PATH);
        assert_eq!(options.get_delegate(), Delegate::Gpu);
        assert!(options.get_output_blendshapes());
        assert_eq!(options.get_num_faces(), 1);

        let options = options.delegate(Delegate::Cpu).model_asset_path("model.task");
        assert_eq!(options.get_delegate(), Delegate::Cpu);
        assert_eq!(options.get_model_asset_path(), "model.task");
    }

    #[test]
    fn parse_delegate() {
        assert_eq!("GPU".parse::<Delegate>().unwrap(), Delegate::Gpu);
        assert_eq!(" cpu ".parse::<Delegate>().unwrap(), Delegate::Cpu);
        assert!("tpu".parse::<Delegate>().is_err());
    }

    #[test]
    fn initialize_failure() {
        let err = Detector::initialize(DetectorOptions::default(), &*failing_factory()).unwrap_err();
        assert!(matches!(err, Error::InitFailure(_)), "{err:?}");
    }

    #[test]
    fn detect_passes_through() {
        let script = Script::new(synthetic_face().into_result());
        let mut detector =
            Detector::initialize(DetectorOptions::default(), &*script.factory()).unwrap();
        let result = detector.detect(&frame(), 0.0).unwrap();
        assert_eq!(result.faces.len(), 1);
        assert_eq!(script.detections(), 1);

        script.set_result(None);
        let err = detector.detect(&frame(), 1.0).unwrap_err();
        assert!(matches!(err, Error::Detection(_)), "{err:?}");
    }

    #[test]
    fn timestamps_must_not_decrease() {
        let script = Script::new(DetectionResult::default());
        let mut detector =
            Detector::initialize(DetectorOptions::default(), &*script.factory()).unwrap();
        detector.detect(&frame(), 10.0).unwrap();
        detector.detect(&frame(), 10.0).unwrap();
        let err = detector.detect(&frame(), 9.5).unwrap_err();
        assert!(
            matches!(
                err,
                Error::TimestampRegression {
                    previous,
                    current,
                } if previous == 10.0 && current == 9.5
            ),
            "{err:?}"
        );
        assert_eq!(script.detections(), 2);

        // A rejected timestamp doesn't become the new baseline.
        detector.detect(&frame(), 10.5).unwrap();
    }

    #[test]
    fn use_after_dispose() {
        let script = Script::new(DetectionResult::default());
        let mut detector =
            Detector::initialize(DetectorOptions::default(), &*script.factory()).unwrap();
        detector.dispose();
        assert!(script.is_closed());
        assert!(detector.is_disposed());
        detector.dispose();

        let err = detector.detect(&frame(), 0.0).unwrap_err();
        assert!(matches!(err, Error::UseAfterDispose), "{err:?}");
        assert_eq!(script.detections(), 0);
    }

    #[test]
    fn drop_disposes() {
        let script = Script::new(DetectionResult::default());
        let detector =
            Detector::initialize(DetectorOptions::default(), &*script.factory()).unwrap();
        assert!(!script.is_closed());
        drop(detector);
        assert!(script.is_closed());
    }
}
