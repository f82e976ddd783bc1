//! The video source the overlay is layered on top of.

use crate::{image::Image, resolution::Resolution};

/// Playback state of a [`VideoSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoStatus {
    /// Native resolution of the video frames.
    pub resolution: Resolution,
    /// Whether enough data is buffered to present the current frame.
    pub current_frame_ready: bool,
    pub paused: bool,
    pub ended: bool,
}

impl VideoStatus {
    /// Returns whether a frame should be processed for this status.
    pub fn is_playable(&self) -> bool {
        self.current_frame_ready && !self.paused && !self.ended && !self.resolution.is_empty()
    }
}

/// A live source of video frames, like a camera feed.
pub trait VideoSource {
    fn status(&self) -> VideoStatus;

    /// Returns the frame currently being presented.
    ///
    /// Only meaningful while [`VideoStatus::is_playable`] is `true`.
    fn current_frame(&self) -> &Image;
}

/// A single image presented as a playing video.
///
/// Useful for demos and tests. The playback flags can be changed freely.
#[derive(Clone)]
pub struct StillVideo {
    frame: Image,
    current_frame_ready: bool,
    paused: bool,
    ended: bool,
}

impl StillVideo {
    /// Creates a playing video that always shows `frame`.
    pub fn new(frame: Image) -> Self {
        Self {
            frame,
            current_frame_ready: true,
            paused: false,
            ended: false,
        }
    }

    /// Creates a playing video of empty frames at `resolution`.
    pub fn blank(resolution: Resolution) -> Self {
        Self::new(Image::new(resolution.width(), resolution.height()))
    }

    pub fn set_frame(&mut self, frame: Image) {
        self.frame = frame;
    }

    pub fn set_current_frame_ready(&mut self, ready: bool) {
        self.current_frame_ready = ready;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn set_ended(&mut self, ended: bool) {
        self.ended = ended;
    }
}

impl VideoSource for StillVideo {
    fn status(&self) -> VideoStatus {
        VideoStatus {
            resolution: self.frame.resolution(),
            current_frame_ready: self.current_frame_ready,
            paused: self.paused,
            ended: self.ended,
        }
    }

    fn current_frame(&self) -> &Image {
        &self.frame
    }
}
