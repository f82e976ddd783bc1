use std::{io, sync::Arc, thread};

use crate::{
    cancel::CancellationToken,
    worker::{promise, PromiseHandle},
    Error,
};

use super::{Detector, DetectorFactory, DetectorOptions};

/// The state of a background detector initialization, as returned by [`PendingDetector::poll`].
#[derive(Debug)]
pub enum InitPoll {
    /// The model is still loading.
    Pending,
    /// The model finished loading.
    Ready(Detector),
    /// The model failed to load.
    Failed(Error),
    /// The initialization was cancelled. Any detector it produced has been disposed.
    Cancelled,
}

/// A detector that is being initialized on a background thread.
///
/// Returned by [`spawn_initialize`]. Once [`PendingDetector::poll`] has returned anything but
/// [`InitPoll::Pending`], the handle is spent and should be dropped.
pub struct PendingDetector {
    handle: PromiseHandle<Result<Detector, Error>>,
    token: CancellationToken,
}

impl PendingDetector {
    /// Checks whether initialization has finished, without blocking.
    pub fn poll(&mut self) -> InitPoll {
        if self.token.is_cancelled() {
            if let Ok(Some(Ok(mut detector))) = self.handle.poll() {
                log::debug!("detector finished loading after cancellation, discarding it");
                detector.dispose();
            }
            return InitPoll::Cancelled;
        }

        match self.handle.poll() {
            Ok(None) => InitPoll::Pending,
            Ok(Some(Ok(detector))) => InitPoll::Ready(detector),
            Ok(Some(Err(e))) => InitPoll::Failed(e),
            Err(_) => InitPoll::Failed(Error::InitFailure(anyhow::anyhow!(
                "initialization thread exited without producing a detector"
            ))),
        }
    }

    /// Cancels the initialization. The detector it produces will be disposed and never returned.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Starts creating a [`Detector`] on a background thread.
///
/// If `token` is cancelled before the model has loaded, the new detector is disposed right away
/// instead of being handed out.
pub fn spawn_initialize(
    options: DetectorOptions,
    factory: Arc<dyn DetectorFactory>,
    token: CancellationToken,
) -> io::Result<PendingDetector> {
    let (promise, handle) = promise();
    let thread_token = token.clone();
    thread::Builder::new()
        .name("detector-init".into())
        .spawn(move || {
            log::info!(
                "loading face landmarker model from {}",
                options.get_model_asset_path()
            );
            let result = Detector::initialize(options, &*factory);
            match result {
                Ok(mut detector) if thread_token.is_cancelled() => {
                    log::debug!("detector initialization cancelled, disposing");
                    detector.dispose();
                }
                result => {
                    if result.is_ok() {
                        log::info!("face landmarker loaded");
                    }
                    // If nobody is listening anymore, the detector is disposed when dropped here.
                    promise.fulfill(result).ok();
                }
            }
        })?;

    Ok(PendingDetector { handle, token })
}

#[cfg(test)]
mod tests {
    use crossbeam::channel;

    use crate::{
        landmark::DetectionResult,
        test::{failing_factory, gated_factory, wait_until, Script},
    };

    use super::*;

    fn poll_until_done(pending: &mut PendingDetector) -> InitPoll {
        let mut result = InitPoll::Pending;
        wait_until(|| {
            result = pending.poll();
            !matches!(result, InitPoll::Pending)
        });
        result
    }

    #[test]
    fn loads_in_background() {
        let script = Script::new(DetectionResult::default());
        let (gate, gated) = gated_factory(&script);
        let mut pending =
            spawn_initialize(DetectorOptions::default(), gated, CancellationToken::new()).unwrap();

        assert!(matches!(pending.poll(), InitPoll::Pending));
        gate.send(()).unwrap();
        match poll_until_done(&mut pending) {
            InitPoll::Ready(detector) => assert!(!detector.is_disposed()),
            other => panic!("unexpected poll result: {other:?}"),
        }
    }

    #[test]
    fn failure_is_reported() {
        let mut pending = spawn_initialize(
            DetectorOptions::default(),
            failing_factory(),
            CancellationToken::new(),
        )
        .unwrap();
        match poll_until_done(&mut pending) {
            InitPoll::Failed(Error::InitFailure(_)) => {}
            other => panic!("unexpected poll result: {other:?}"),
        }
    }

    #[test]
    fn cancelled_before_load_disposes() {
        let script = Script::new(DetectionResult::default());
        let (gate, gated) = gated_factory(&script);
        let token = CancellationToken::new();
        let mut pending =
            spawn_initialize(DetectorOptions::default(), gated, token.clone()).unwrap();

        token.cancel();
        assert!(pending.is_cancelled());
        gate.send(()).unwrap();

        wait_until(|| script.is_closed());
        assert!(matches!(pending.poll(), InitPoll::Cancelled));
        assert_eq!(script.detections(), 0);
    }

    #[test]
    fn cancelled_after_load_disposes() {
        let script = Script::new(DetectionResult::default());
        let (done_tx, done_rx) = channel::bounded(1);
        let factory = script.factory();
        let notifying: Arc<dyn DetectorFactory> = Arc::new(move |options: &DetectorOptions| {
            let landmarker = factory.create(options);
            done_tx.send(()).ok();
            landmarker
        });
        let mut pending =
            spawn_initialize(DetectorOptions::default(), notifying, CancellationToken::new())
                .unwrap();

        done_rx.recv().unwrap();
        pending.cancel();
        // Whichever side notices the cancellation first disposes the detector.
        wait_until(|| matches!(pending.poll(), InitPoll::Cancelled) && script.is_closed());
        assert_eq!(script.detections(), 0);
    }
}
