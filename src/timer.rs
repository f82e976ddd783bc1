//! Performance measurement tools.

use std::{
    cell::Cell,
    fmt::{self, Arguments},
    mem,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Smoothing factor of the exponential moving average. Higher values favor recent timings.
const EMA_ALPHA: f32 = 0.3;

/// A timer that can measure and average the time an operation takes.
///
/// Timings are smoothed with an exponential moving average. The average is reset when the timer
/// is displayed using `{}` ([`std::fmt::Display`]).
pub struct Timer {
    name: &'static str,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// The current average time in seconds, or `None` if nothing was recorded since the reset.
    avg: Option<f32>,
    /// The number of time measurements that contributed to the current `avg`.
    count: usize,
}

impl State {
    fn record(&mut self, secs: f32) {
        self.avg = Some(match self.avg {
            Some(prev) => prev + EMA_ALPHA * (secs - prev),
            None => secs,
        });
        self.count += 1;
    }
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::default()),
        }
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start` and the
    /// drop is measured and recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    /// Returns the number of measurements recorded since the last reset.
    pub fn count(&self) -> usize {
        self.lock().count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Nothing panics while holding the lock, but don't lose timings if something ever does.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stop(&self, start: Instant) {
        let duration = start.elapsed();
        self.lock().record(duration.as_secs_f32());
    }
}

/// Displays the average recorded time and resets it.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = mem::take(&mut *self.lock());
        let avg_ms = state.avg.unwrap_or(0.0) * 1000.0;
        let len = state.count;

        write!(f, "{}: {len}x{avg_ms:.01}ms", self.name)
    }
}

/// Cloning a timer resets its collected timings.
impl Clone for Timer {
    fn clone(&self) -> Self {
        Self::new(self.name)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.stop(self.start);
    }
}

/// Logs frames per second with optional extra data.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Advances the frame counter by 1 and logs FPS and `extra` data if one second has passed.
    ///
    /// `extra` is only iterated when a log line is actually emitted, so passing timers here
    /// resets their averages once per second.
    pub fn tick_with<D: fmt::Display, I: IntoIterator<Item = D>>(&mut self, extra: I) {
        struct DisplayExtra<D: fmt::Display, I: Iterator<Item = D>>(Cell<Option<I>>);

        impl<D: fmt::Display, I: Iterator<Item = D>> fmt::Display for DisplayExtra<D, I> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let Some(mut iter) = self.0.take() else {
                    return Ok(());
                };
                match iter.next() {
                    Some(item) => {
                        f.write_str(" (")?;
                        write!(f, "{}", item)?;
                        for item in iter {
                            f.write_str(", ")?;
                            write!(f, "{}", item)?;
                        }
                        f.write_str(")")?;
                        Ok(())
                    }
                    None => Ok(()),
                }
            }
        }

        self.tick_impl(format_args!(
            "{}",
            DisplayExtra(Cell::new(Some(extra.into_iter())))
        ));
    }

    fn tick_impl(&mut self, args: Arguments<'_>) {
        self.frames += 1;
        if self.start.elapsed() > Duration::from_secs(1) {
            log::debug!("{}: {} FPS{}", self.name, self.frames, args);

            self.frames = 0;
            self.start = Instant::now();
        }
    }
}
