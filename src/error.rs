use std::error::Error as _;
use std::fmt;

/// Errors produced by the overlay pipeline.
///
/// None of these are fatal to a running [`RenderLoop`](crate::scheduler::RenderLoop): per-frame
/// failures are logged and the next frame is attempted as usual.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The landmark model failed to load. The overlay stays disabled until the detector is
    /// reloaded externally.
    #[error("failed to initialize face landmarker")]
    InitFailure(#[source] anyhow::Error),

    /// A texture could not be fetched or decoded. Only that key is affected.
    #[error("failed to load texture '{key}'")]
    DecodeFailure {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// A disposed [`Detector`](crate::detector::Detector) was asked to run detection.
    #[error("face landmarker used after it was disposed")]
    UseAfterDispose,

    /// Detection was invoked with a timestamp older than the previous one.
    #[error("detection timestamp went backwards ({previous}ms -> {current}ms)")]
    TimestampRegression { previous: f64, current: f64 },

    /// The landmark model failed on a frame.
    #[error("face landmark detection failed")]
    Detection(#[source] anyhow::Error),
}

impl Error {
    /// Returns a [`Display`](fmt::Display) adapter that prints the whole chain of causes.
    pub(crate) fn chain(&self) -> impl fmt::Display + '_ {
        struct Chain<'a>(&'a Error);

        impl fmt::Display for Chain<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)?;
                let mut source = self.0.source();
                while let Some(err) = source {
                    write!(f, ": {}", err)?;
                    source = err.source();
                }
                Ok(())
            }
        }

        Chain(self)
    }
}
