//! The per-frame overlay pipeline.
//!
//! [`Pipeline::render`] does the work of a single display refresh: it resizes and clears the
//! render surface, runs landmark detection on the current video frame, extracts eye geometry, and
//! draws the configured [`Overlay`] for every eye. It never blocks on the detector loading or on
//! textures decoding; until those are done, frames simply come out empty.

use std::{io, sync::Arc, time::Instant};

use crossbeam::channel::{self, Receiver, Sender};

use crate::{
    cancel::CancellationToken,
    detector::{
        spawn_initialize, Detector, DetectorFactory, DetectorOptions, InitPoll, PendingDetector,
    },
    eye::EyeGeometry,
    image::{Color, Image},
    overlay::Overlay,
    texture::{TextureCache, TextureSource},
    timer::{FpsCounter, Timer},
    video::VideoSource,
    Config, Error,
};

/// What happened during a [`Pipeline::render`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// There was no playable video frame. The surface was left untouched.
    Skipped,
    /// The landmark model isn't loaded (yet, or at all). The surface was cleared.
    NoDetector,
    /// No face was found. The surface was cleared.
    NoFace,
    /// The overlay needs a texture, but none is selected or the selected one isn't decoded yet.
    /// The surface was cleared.
    NoTexture,
    /// The overlay was drawn for `eyes` eyes.
    Drawn { eyes: usize },
}

/// Loading state of the landmark model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Loading,
    Ready,
    /// Loading failed or was cancelled. Only [`Pipeline::reload_detector`] gets out of this.
    Unavailable,
}

enum DetectorSlot {
    Loading(PendingDetector),
    Ready(Detector),
    Unavailable,
}

/// Publishes the selected texture to a [`Pipeline`].
///
/// Can be cloned and sent to other threads. The pipeline picks up the most recent selection at
/// the start of its next frame.
#[derive(Clone)]
pub struct SelectionHandle {
    sender: Sender<Option<String>>,
}

impl SelectionHandle {
    /// Selects the texture identified by `key`.
    pub fn select<K: Into<String>>(&self, key: K) {
        self.set(Some(key.into()));
    }

    /// Removes the selection. Texture overlays will stop drawing.
    pub fn clear(&self) {
        self.set(None);
    }

    pub fn set(&self, key: Option<String>) {
        // The pipeline holds a sender itself, so the channel can't be disconnected while it
        // exists. If it's gone, nobody cares about the selection anymore.
        self.sender.send(key).ok();
    }
}

/// Runs detection and compositing for one frame at a time.
pub struct Pipeline {
    surface: Image,
    detector: DetectorSlot,
    detector_options: DetectorOptions,
    factory: Arc<dyn DetectorFactory>,
    textures: TextureCache,
    selection_sender: Sender<Option<String>>,
    selection_recv: Receiver<Option<String>>,
    selected: Option<String>,
    overlay: Box<dyn Overlay>,
    geometry: EyeGeometry,
    epoch: Instant,
    last_timestamp: f64,
    t_extract: Timer,
    t_draw: Timer,
    fps: FpsCounter,
}

impl Pipeline {
    /// Creates a pipeline that loads textures from the configured texture root.
    ///
    /// This starts loading the landmark model in the background.
    pub fn from_config(config: &Config, factory: Arc<dyn DetectorFactory>) -> io::Result<Self> {
        Self::new(config, factory, config.texture_source())
    }

    /// Creates a pipeline that loads textures from `textures`.
    ///
    /// This starts loading the landmark model in the background.
    pub fn new<S: TextureSource>(
        config: &Config,
        factory: Arc<dyn DetectorFactory>,
        textures: S,
    ) -> io::Result<Self> {
        let overlay = config.create_overlay();
        let geometry = config.eye_geometry(&*overlay);
        let detector_options = config.get_detector_options().clone();
        let pending = spawn_initialize(
            detector_options.clone(),
            factory.clone(),
            CancellationToken::new(),
        )?;
        let (selection_sender, selection_recv) = channel::unbounded();

        log::info!(
            "starting {} overlay pipeline",
            config.get_overlay_style()
        );
        Ok(Self {
            surface: Image::new(0, 0),
            detector: DetectorSlot::Loading(pending),
            detector_options,
            factory,
            textures: TextureCache::new(textures)?,
            selection_sender,
            selection_recv,
            selected: None,
            overlay,
            geometry,
            epoch: Instant::now(),
            last_timestamp: 0.0,
            t_extract: Timer::new("extract"),
            t_draw: Timer::new("draw"),
            fps: FpsCounter::new("overlay"),
        })
    }

    /// Returns a handle for changing the selected texture.
    pub fn selection_handle(&self) -> SelectionHandle {
        SelectionHandle {
            sender: self.selection_sender.clone(),
        }
    }

    /// Returns the key of the currently selected texture, as of the last frame.
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Returns the render surface, to be layered on top of the video.
    ///
    /// The surface always has the resolution of the last processed video frame. Everything that
    /// isn't covered by the overlay is fully transparent.
    pub fn surface(&self) -> &Image {
        &self.surface
    }

    pub fn textures(&mut self) -> &mut TextureCache {
        &mut self.textures
    }

    /// Returns the loading state of the landmark model, checking for completion first.
    pub fn detector_state(&mut self) -> DetectorState {
        self.poll_detector();
        match self.detector {
            DetectorSlot::Loading(_) => DetectorState::Loading,
            DetectorSlot::Ready(_) => DetectorState::Ready,
            DetectorSlot::Unavailable => DetectorState::Unavailable,
        }
    }

    /// Discards the current landmark model (or the attempt to load one) and starts loading it
    /// again.
    pub fn reload_detector(&mut self) -> io::Result<()> {
        log::info!("reloading face landmarker");
        let pending = spawn_initialize(
            self.detector_options.clone(),
            self.factory.clone(),
            CancellationToken::new(),
        )?;
        let previous = std::mem::replace(&mut self.detector, DetectorSlot::Loading(pending));
        if let DetectorSlot::Loading(previous) = &previous {
            previous.cancel();
        }
        Ok(())
    }

    /// Renders one frame.
    ///
    /// Errors only affect the current frame. The caller should log them and carry on.
    pub fn render(&mut self, video: Option<&dyn VideoSource>) -> Result<FrameOutcome, Error> {
        let outcome = self.render_frame(video);
        if !matches!(outcome, Ok(FrameOutcome::Skipped)) {
            self.tick_fps();
        }
        outcome
    }

    fn render_frame(&mut self, video: Option<&dyn VideoSource>) -> Result<FrameOutcome, Error> {
        self.update_selection();
        self.poll_detector();

        let Some(video) = video else {
            return Ok(FrameOutcome::Skipped);
        };
        let status = video.status();
        if !status.is_playable() {
            log::trace!("skipping frame: {status:?}");
            return Ok(FrameOutcome::Skipped);
        }

        self.surface.resize_to(status.resolution);
        self.surface.clear(Color::NULL);

        let timestamp = self.next_timestamp();
        let DetectorSlot::Ready(detector) = &mut self.detector else {
            return Ok(FrameOutcome::NoDetector);
        };
        let result = detector.detect(video.current_frame(), timestamp)?;
        let Some(face) = result.first_face() else {
            return Ok(FrameOutcome::NoFace);
        };

        let texture = if self.overlay.needs_texture() {
            let Some(key) = self.selected.as_deref() else {
                return Ok(FrameOutcome::NoTexture);
            };
            match self.textures.get(key) {
                Some(texture) => Some(texture),
                None => return Ok(FrameOutcome::NoTexture),
            }
        } else {
            None
        };

        let resolution = self.surface.resolution();
        let eyes = self
            .t_extract
            .time(|| self.geometry.extract(face, resolution));
        self.t_draw.time(|| {
            for eye in eyes.iter() {
                self.overlay.draw(&mut self.surface, eye, texture);
            }
        });

        Ok(FrameOutcome::Drawn { eyes: eyes.len() })
    }

    fn update_selection(&mut self) {
        let Some(latest) = self.selection_recv.try_iter().last() else {
            return;
        };
        if latest == self.selected {
            return;
        }

        log::info!("texture selection changed: {:?} -> {:?}", self.selected, latest);
        if let Some(key) = &latest {
            if self.overlay.needs_texture() {
                self.textures.request(key);
            }
        }
        self.selected = latest;
    }

    fn poll_detector(&mut self) {
        let DetectorSlot::Loading(pending) = &mut self.detector else {
            return;
        };
        match pending.poll() {
            InitPoll::Pending => {}
            InitPoll::Ready(detector) => {
                log::info!("face landmarker ready");
                self.detector = DetectorSlot::Ready(detector);
            }
            InitPoll::Failed(err) => {
                log::error!("{}; overlay disabled", err.chain());
                self.detector = DetectorSlot::Unavailable;
            }
            InitPoll::Cancelled => {
                self.detector = DetectorSlot::Unavailable;
            }
        }
    }

    /// Milliseconds since the pipeline was created, never smaller than the previous value.
    fn next_timestamp(&mut self) -> f64 {
        let now = self.epoch.elapsed().as_secs_f64() * 1000.0;
        self.last_timestamp = now.max(self.last_timestamp);
        self.last_timestamp
    }

    fn tick_fps(&mut self) {
        let detector_timers = match &self.detector {
            DetectorSlot::Ready(detector) => detector.timers().into_iter().collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        self.fps.tick_with(
            detector_timers
                .into_iter()
                .chain([&self.t_extract, &self.t_draw]),
        );
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let DetectorSlot::Loading(pending) = &self.detector {
            pending.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::{
        detector::FaceLandmarker,
        eye::Eye,
        landmark::DetectionResult,
        overlay::OverlayStyle,
        resolution::Resolution,
        test::{
            failing_factory, gated_factory, png_bytes, synthetic_face, wait_until, MemorySource,
            Script,
        },
        video::StillVideo,
    };

    use super::*;

    const VGA: Resolution = Resolution::new(640, 480);

    fn video() -> StillVideo {
        StillVideo::blank(VGA)
    }

    fn textures() -> MemorySource {
        MemorySource::new()
            .with("black.png", png_bytes(8, 8, Color::BLACK))
            .with("red.png", png_bytes(8, 8, Color::RED))
    }

    fn ready_pipeline(config: &Config, script: &Arc<Script>, source: MemorySource) -> Pipeline {
        let mut pipeline = Pipeline::new(config, script.factory(), source).unwrap();
        wait_until(|| pipeline.detector_state() == DetectorState::Ready);
        pipeline
    }

    /// Renders until the selected texture is decoded and the overlay is drawn.
    fn render_until_drawn(pipeline: &mut Pipeline, video: &StillVideo) -> FrameOutcome {
        let mut outcome = FrameOutcome::Skipped;
        wait_until(|| {
            outcome = pipeline.render(Some(video)).unwrap();
            matches!(outcome, FrameOutcome::Drawn { .. })
        });
        outcome
    }

    fn count_drawn(surface: &Image, xs: std::ops::Range<u32>) -> usize {
        let mut count = 0;
        for y in 0..surface.height() {
            for x in xs.clone() {
                if surface.get(x, y) != Color::NULL {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn both_eyes_open_circle_clip() {
        let script = Script::new(synthetic_face().without_blendshapes().into_result());
        let mut pipeline = ready_pipeline(&Config::new(), &script, textures());
        pipeline.selection_handle().select("black.png");
        let video = video();

        assert_eq!(
            render_until_drawn(&mut pipeline, &video),
            FrameOutcome::Drawn { eyes: 2 }
        );
        let surface = pipeline.surface();
        assert_eq!(surface.resolution(), VGA);

        // Black darkening a transparent surface at 50%.
        let tint = Color::BLACK.with_alpha(128);
        assert_eq!(surface.get(160, 240), tint);
        assert_eq!(surface.get(480, 240), tint);
        // Radius 13, so the clip circle has radius 15.6.
        assert_eq!(surface.get(174, 240), tint);
        assert_eq!(surface.get(178, 240), Color::NULL);
        // Corners of the draw square are outside of the circle.
        assert_eq!(surface.get(145, 226), Color::NULL);
        assert_eq!(surface.get(320, 240), Color::NULL);

        let left = count_drawn(surface, 0..320);
        assert!(left > 0);
        assert_eq!(left, count_drawn(surface, 320..640));
        assert_eq!(
            surface.count_pixels(|c| c != Color::NULL),
            surface.count_pixels(|c| c == tint)
        );
    }

    #[test]
    fn closed_eye_rect_clip() {
        let face = synthetic_face()
            .without_blendshapes()
            .closure(Eye::Left, 0.9)
            .into_result();
        let script = Script::new(face);
        let mut pipeline = ready_pipeline(&Config::new(), &script, textures());
        pipeline.selection_handle().select("black.png");
        let video = video();

        render_until_drawn(&mut pipeline, &video);
        let surface = pipeline.surface();
        let tint = Color::BLACK.with_alpha(128);

        // Left: the eyelid box (130..190 x 234..246) cut down to the iris-centered draw square
        // (143.75..176.25 on both axes around the center).
        assert_eq!(count_drawn(surface, 0..320), 32 * 12);
        assert_eq!(surface.get(144, 234), tint);
        assert_eq!(surface.get(175, 245), tint);
        assert_eq!(surface.get(160, 233), Color::NULL);
        assert_eq!(surface.get(160, 246), Color::NULL);

        // Right: no closure score, circular clip.
        assert_eq!(surface.get(480, 240), tint);
        assert_eq!(surface.get(465, 227), Color::NULL);
    }

    #[test]
    fn no_face_clears_surface() {
        let script = Script::new(synthetic_face().into_result());
        let mut pipeline = ready_pipeline(&Config::new(), &script, textures());
        pipeline.selection_handle().select("black.png");
        let video = video();
        render_until_drawn(&mut pipeline, &video);
        assert!(pipeline.surface().count_pixels(|c| c != Color::NULL) > 0);

        script.set_result(Some(DetectionResult::default()));
        assert_eq!(pipeline.render(Some(&video)).unwrap(), FrameOutcome::NoFace);
        assert_eq!(pipeline.surface().count_pixels(|c| c != Color::NULL), 0);

        // Detection errors are reported, and also leave a clear surface behind.
        script.set_result(Some(synthetic_face().into_result()));
        render_until_drawn(&mut pipeline, &video);
        script.set_result(None);
        let err = pipeline.render(Some(&video)).unwrap_err();
        assert!(matches!(err, Error::Detection(_)), "{err:?}");
        assert_eq!(pipeline.surface().count_pixels(|c| c != Color::NULL), 0);
    }

    #[test]
    fn switching_texture_waits_for_decode() {
        let (source, gate) = textures().gated();
        let script = Script::new(synthetic_face().into_result());
        let mut pipeline = ready_pipeline(&Config::new(), &script, source);
        let video = video();
        let selection = pipeline.selection_handle();

        selection.select("black.png");
        assert_eq!(pipeline.render(Some(&video)).unwrap(), FrameOutcome::NoTexture);
        gate.send(()).unwrap();
        render_until_drawn(&mut pipeline, &video);
        assert_eq!(pipeline.surface().get(160, 240), Color::BLACK.with_alpha(128));

        selection.select("red.png");
        assert_eq!(pipeline.render(Some(&video)).unwrap(), FrameOutcome::NoTexture);
        assert_eq!(pipeline.selected(), Some("red.png"));
        assert_eq!(pipeline.surface().count_pixels(|c| c != Color::NULL), 0);
        assert!(pipeline.textures().is_ready("black.png"));
        assert!(!pipeline.textures().is_ready("red.png"));

        gate.send(()).unwrap();
        render_until_drawn(&mut pipeline, &video);
        assert_eq!(pipeline.surface().get(160, 240), Color::RED.with_alpha(128));

        selection.clear();
        assert_eq!(pipeline.render(Some(&video)).unwrap(), FrameOutcome::NoTexture);
    }

    #[test]
    fn latest_selection_wins() {
        let script = Script::new(synthetic_face().into_result());
        let mut pipeline = ready_pipeline(&Config::new(), &script, textures());
        let selection = pipeline.selection_handle();
        selection.select("black.png");
        selection.select("red.png");
        pipeline.render(None).unwrap();
        assert_eq!(pipeline.selected(), Some("red.png"));
        // Only the final selection was requested.
        assert_eq!(pipeline.textures().len(), 1);
    }

    #[test]
    fn dots_need_no_texture() {
        let face = synthetic_face().closure(Eye::Left, 1.0).into_result();
        let script = Script::new(face);
        let config = Config::new().overlay_style(OverlayStyle::Dots);
        let mut pipeline = ready_pipeline(&config, &script, MemorySource::new());
        let video = video();

        assert_eq!(
            pipeline.render(Some(&video)).unwrap(),
            FrameOutcome::Drawn { eyes: 2 }
        );
        assert_eq!(pipeline.surface().get(160, 240), Color::BLACK);
        assert_eq!(pipeline.surface().get(480, 240), Color::BLACK);
        assert!(pipeline.textures().is_empty());
    }

    #[test]
    fn unplayable_video_is_skipped() {
        let script = Script::new(synthetic_face().into_result());
        let mut pipeline = ready_pipeline(&Config::new(), &script, textures());
        let mut video = video();

        assert_eq!(pipeline.render(None).unwrap(), FrameOutcome::Skipped);
        video.set_paused(true);
        assert_eq!(pipeline.render(Some(&video)).unwrap(), FrameOutcome::Skipped);
        video.set_paused(false);
        video.set_current_frame_ready(false);
        assert_eq!(pipeline.render(Some(&video)).unwrap(), FrameOutcome::Skipped);
        video.set_current_frame_ready(true);
        video.set_ended(true);
        assert_eq!(pipeline.render(Some(&video)).unwrap(), FrameOutcome::Skipped);

        assert_eq!(script.detections(), 0);
        assert_eq!(pipeline.surface().resolution(), Resolution::new(0, 0));
    }

    #[test]
    fn surface_follows_video_resolution() {
        let script = Script::new(DetectionResult::default());
        let mut pipeline = ready_pipeline(&Config::new(), &script, textures());

        let mut video = StillVideo::blank(Resolution::new(320, 240));
        pipeline.render(Some(&video)).unwrap();
        assert_eq!(pipeline.surface().resolution(), Resolution::new(320, 240));
        video.set_frame(Image::new(1280, 720));
        pipeline.render(Some(&video)).unwrap();
        assert_eq!(pipeline.surface().resolution(), Resolution::new(1280, 720));
    }

    #[test]
    fn timestamps_never_decrease() {
        let script = Script::new(synthetic_face().into_result());
        let mut pipeline = ready_pipeline(&Config::new(), &script, textures());
        let video = video();
        for _ in 0..20 {
            pipeline.render(Some(&video)).unwrap();
        }
        let timestamps = script.timestamps();
        assert_eq!(timestamps.len(), 20);
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]), "{timestamps:?}");
    }

    #[test]
    fn renders_without_detector() {
        let script = Script::new(synthetic_face().into_result());
        let (gate, factory) = gated_factory(&script);
        let mut pipeline = Pipeline::new(&Config::new(), factory, textures()).unwrap();
        let video = video();

        assert_eq!(pipeline.detector_state(), DetectorState::Loading);
        assert_eq!(pipeline.render(Some(&video)).unwrap(), FrameOutcome::NoDetector);
        assert_eq!(pipeline.surface().resolution(), VGA);

        gate.send(()).unwrap();
        wait_until(|| pipeline.detector_state() == DetectorState::Ready);
        assert_ne!(pipeline.render(Some(&video)).unwrap(), FrameOutcome::NoDetector);
    }

    #[test]
    fn init_failure_disables_overlay() {
        let mut pipeline = Pipeline::new(&Config::new(), failing_factory(), textures()).unwrap();
        wait_until(|| pipeline.detector_state() == DetectorState::Unavailable);
        let video = video();
        assert_eq!(pipeline.render(Some(&video)).unwrap(), FrameOutcome::NoDetector);
    }

    #[test]
    fn reload_after_failure() {
        let script = Script::new(synthetic_face().into_result());
        let attempts = Arc::new(AtomicUsize::new(0));
        let inner = script.factory();
        let counter = attempts.clone();
        let flaky: Arc<dyn DetectorFactory> = Arc::new(
            move |options: &DetectorOptions| -> anyhow::Result<Box<dyn FaceLandmarker>> {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("model download interrupted");
                }
                inner.create(options)
            },
        );
        let mut pipeline = Pipeline::new(&Config::new(), flaky, textures()).unwrap();
        wait_until(|| pipeline.detector_state() == DetectorState::Unavailable);

        pipeline.reload_detector().unwrap();
        wait_until(|| pipeline.detector_state() == DetectorState::Ready);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn drop_cancels_loading_detector() {
        let script = Script::new(synthetic_face().into_result());
        let (gate, factory) = gated_factory(&script);
        let pipeline = Pipeline::new(&Config::new(), factory, textures()).unwrap();
        drop(pipeline);

        gate.send(()).unwrap();
        wait_until(|| script.is_closed());
        assert_eq!(script.detections(), 0);
    }

    #[test]
    fn drop_disposes_detector() {
        let script = Script::new(synthetic_face().into_result());
        let pipeline = ready_pipeline(&Config::new(), &script, textures());
        assert!(!script.is_closed());
        drop(pipeline);
        assert!(script.is_closed());
    }
}
