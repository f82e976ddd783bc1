//! Real-time eye tracking and contact lens overlay.
//!
//! `lensfit` takes the face landmarks produced by an external landmark model for each video frame,
//! derives the geometry of both eyes from them, and composites a product texture (typically a
//! contact lens tint) onto a transparent surface meant to be layered on top of the video.
//!
//! The moving parts, leaves first:
//!
//! - [`detector`]: wraps the external [`FaceLandmarker`](detector::FaceLandmarker) model, including
//!   its asynchronous, cancellable initialization.
//! - [`eye`]: turns one face's landmarks and blendshape scores into [`EyeDescriptor`]s.
//! - [`texture`]: decodes product textures in the background and memoizes them.
//! - [`overlay`]: draws eye descriptors onto the output surface.
//! - [`pipeline`] and [`scheduler`]: run all of the above once per display refresh.
//!
//! # Coordinates
//!
//! Landmarks are normalized to `0.0..=1.0` relative to the video frame. Everything downstream of
//! [`eye`] is in pixels of the output surface, with X pointing right and Y pointing down.
//!
//! # Environment Variables
//!
//! [`Config::from_env`] reads the following overrides:
//!
//! * `LENSFIT_OVERLAY`: `lens` (default) composites the selected texture, `dots` draws plain
//!   filled circles over the irises.
//! * `LENSFIT_TEXTURE_ROOT`: directory that texture keys are resolved against.
//! * `LENSFIT_FPS`: refresh rate of the render loop when driven by an
//!   [`IntervalClock`](scheduler::IntervalClock).
//! * `LENSFIT_MODEL_PATH`: location of the landmark model asset (URL or local path).
//! * `LENSFIT_DELEGATE`: `gpu` or `cpu`, the runtime the landmark model should use.
//!
//! [`EyeDescriptor`]: eye::EyeDescriptor

use log::LevelFilter;

pub mod cancel;
pub mod config;
pub mod detector;
mod error;
pub mod eye;
pub mod image;
pub mod landmark;
pub mod num;
pub mod overlay;
pub mod pipeline;
pub mod resolution;
pub mod scheduler;
pub mod texture;
pub mod timer;
pub mod video;
pub mod worker;


pub use config::Config;
pub use error::Error;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and `lensfit` will log at *trace*
/// level. Otherwise, they will log at *debug* level. `RUST_LOG` takes precedence.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
