//! The render loop.
//!
//! A [`RenderLoop`] owns a [`Pipeline`] and renders one frame per display refresh. It is driven
//! from the outside: whatever provides the refresh signal calls [`RenderLoop::on_refresh`], or
//! [`RenderLoop::run`] drives it with a [`RefreshClock`].
//!
//! At most one tick is ever scheduled. Stopping drops it, so no frame is rendered after
//! [`RenderLoop::stop`] returns, and restarting can never result in two interleaved loops.

use std::{
    thread,
    time::{Duration, Instant},
};

use crate::{
    cancel::CancellationToken,
    pipeline::{FrameOutcome, Pipeline},
    video::VideoSource,
};

/// Lifecycle state of a [`RenderLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Created, but never started.
    Idle,
    /// A tick is scheduled for every refresh.
    Running,
    /// Stopped. [`RenderLoop::start`] resumes it.
    Stopped,
}

/// Result of a [`RenderLoop::on_refresh`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No tick was scheduled, nothing happened.
    NotScheduled,
    /// A frame was rendered.
    Rendered(FrameOutcome),
    /// Rendering failed. The error was logged.
    Failed,
}

/// Waits for the next display refresh.
pub trait RefreshClock {
    /// Blocks until it is time to render the next frame.
    fn wait_for_refresh(&mut self);
}

/// A [`RefreshClock`] with a fixed refresh rate.
///
/// If a frame takes longer than one interval, the missed refreshes are skipped instead of
/// rendering several frames back to back.
#[derive(Debug)]
pub struct IntervalClock {
    interval: Duration,
    next: Option<Instant>,
}

impl IntervalClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    /// Creates a clock that refreshes `fps` times per second.
    ///
    /// # Panics
    ///
    /// Panics if `fps` is 0.
    pub fn from_fps(fps: u32) -> Self {
        assert!(fps > 0, "refresh rate must be greater than 0");
        Self::new(Duration::from_secs(1) / fps)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl RefreshClock for IntervalClock {
    fn wait_for_refresh(&mut self) {
        let now = Instant::now();
        let deadline = match self.next {
            Some(next) if next > now => next,
            Some(_) => {
                log::trace!("render loop fell behind, skipping missed refreshes");
                now
            }
            None => now + self.interval,
        };
        if let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            thread::sleep(remaining);
        }
        self.next = Some(deadline + self.interval);
    }
}

/// Schedules [`Pipeline`] frames.
pub struct RenderLoop {
    pipeline: Pipeline,
    state: LoopState,
    /// Incremented on every start and stop, invalidating previously scheduled ticks.
    generation: u64,
    /// The generation the scheduled tick belongs to, if one is scheduled.
    scheduled: Option<u64>,
}

impl RenderLoop {
    /// Creates an idle render loop.
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            state: LoopState::Idle,
            generation: 0,
            scheduled: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Returns whether a tick will run on the next refresh.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled == Some(self.generation)
    }

    /// Starts (or restarts) the loop. Does nothing if it is already running.
    pub fn start(&mut self) {
        if self.state == LoopState::Running {
            return;
        }

        self.generation += 1;
        self.scheduled = Some(self.generation);
        self.state = LoopState::Running;
        log::debug!("render loop started (generation {})", self.generation);
    }

    /// Stops the loop. The scheduled tick, if any, is cancelled.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.scheduled = None;
        if self.state == LoopState::Running {
            log::debug!("render loop stopped");
        }
        self.state = LoopState::Stopped;
    }

    /// Runs the scheduled tick, if there is one, and schedules the next.
    ///
    /// Errors are logged and never stop the loop.
    pub fn on_refresh(&mut self, video: Option<&dyn VideoSource>) -> Tick {
        match self.scheduled.take() {
            Some(generation) if generation == self.generation => {}
            _ => return Tick::NotScheduled,
        }

        let tick = match self.pipeline.render(video) {
            Ok(outcome) => {
                log::trace!("frame: {outcome:?}");
                Tick::Rendered(outcome)
            }
            Err(e) => {
                log::warn!("frame failed: {}", e.chain());
                Tick::Failed
            }
        };

        self.scheduled = Some(self.generation);
        tick
    }

    /// Starts the loop and renders a frame on every refresh of `clock`, until `cancel` is
    /// cancelled. The loop is stopped when this returns.
    pub fn run(
        &mut self,
        clock: &mut dyn RefreshClock,
        video: &dyn VideoSource,
        cancel: &CancellationToken,
    ) {
        self.start();
        while !cancel.is_cancelled() {
            clock.wait_for_refresh();
            if cancel.is_cancelled() {
                break;
            }
            self.on_refresh(Some(video));
        }
        self.stop();
    }
}
