//! Pipeline configuration.

use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::bail;

use crate::{
    detector::{Delegate, DetectorOptions},
    eye::{EyeGeometry, CLOSURE_THRESHOLD},
    overlay::{Overlay, OverlayStyle},
    texture::FsTextureSource,
};

const ENV_OVERLAY: &str = "LENSFIT_OVERLAY";
const ENV_TEXTURE_ROOT: &str = "LENSFIT_TEXTURE_ROOT";
const ENV_FPS: &str = "LENSFIT_FPS";
const ENV_MODEL_PATH: &str = "LENSFIT_MODEL_PATH";
const ENV_DELEGATE: &str = "LENSFIT_DELEGATE";

/// Configuration of an overlay [`Pipeline`](crate::pipeline::Pipeline).
///
/// Built with the setter methods, or from environment variables via [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    overlay: OverlayStyle,
    texture_root: PathBuf,
    fps: u32,
    closure_threshold: f32,
    detector: DetectorOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            overlay: OverlayStyle::Lens,
            texture_root: PathBuf::from("."),
            fps: 60,
            closure_threshold: CLOSURE_THRESHOLD,
            detector: DetectorOptions::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a default configuration, overridden by any `LENSFIT_*` environment variables.
    ///
    /// See the [crate documentation](crate) for the list of variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(&|name: &str| env::var(name).ok())
    }

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(style) = parse_var::<OverlayStyle>(lookup, ENV_OVERLAY)? {
            config.overlay = style;
        }
        if let Some(root) = lookup(ENV_TEXTURE_ROOT) {
            config.texture_root = root.into();
        }
        if let Some(fps) = parse_var::<u32>(lookup, ENV_FPS)? {
            if fps == 0 {
                bail!("{ENV_FPS} must be greater than 0");
            }
            config.fps = fps;
        }
        if let Some(path) = lookup(ENV_MODEL_PATH) {
            config.detector = config.detector.model_asset_path(path);
        }
        if let Some(delegate) = parse_var::<Delegate>(lookup, ENV_DELEGATE)? {
            config.detector = config.detector.delegate(delegate);
        }

        log::debug!("configuration: {config:?}");
        Ok(config)
    }

    pub fn overlay_style(self, overlay: OverlayStyle) -> Self {
        Self { overlay, ..self }
    }

    /// Sets the directory texture keys are resolved against.
    pub fn texture_root<P: Into<PathBuf>>(self, root: P) -> Self {
        Self {
            texture_root: root.into(),
            ..self
        }
    }

    /// Sets the refresh rate used by [`Config::refresh_interval`].
    ///
    /// # Panics
    ///
    /// Panics if `fps` is 0.
    pub fn fps(self, fps: u32) -> Self {
        assert!(fps > 0, "refresh rate must be greater than 0");
        Self { fps, ..self }
    }

    pub fn closure_threshold(self, closure_threshold: f32) -> Self {
        Self {
            closure_threshold,
            ..self
        }
    }

    pub fn detector_options(self, detector: DetectorOptions) -> Self {
        Self { detector, ..self }
    }

    pub fn get_overlay_style(&self) -> OverlayStyle {
        self.overlay
    }

    pub fn get_texture_root(&self) -> &Path {
        &self.texture_root
    }

    pub fn get_fps(&self) -> u32 {
        self.fps
    }

    pub fn get_detector_options(&self) -> &DetectorOptions {
        &self.detector
    }

    /// Returns the time between two display refreshes.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps
    }

    /// Creates the configured [`Overlay`].
    pub fn create_overlay(&self) -> Box<dyn Overlay> {
        self.overlay.create()
    }

    /// Creates the eye geometry extractor matching `overlay`.
    pub fn eye_geometry(&self, overlay: &dyn Overlay) -> EyeGeometry {
        EyeGeometry::new()
            .closure_threshold(self.closure_threshold)
            .track_closure(overlay.tracks_closure())
    }

    /// Creates a texture source reading from the configured texture root.
    pub fn texture_source(&self) -> FsTextureSource {
        FsTextureSource::new(self.texture_root.clone())
    }
}

fn parse_var<T>(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: Into<anyhow::Error>,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    match value.parse::<T>() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            let err: anyhow::Error = e.into();
            Err(err.context(format!("invalid value for {name}: '{value}'")))
        }
    }
}
