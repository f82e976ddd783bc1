//! Cooperative cancellation.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A shared flag that tells background work its result is no longer wanted.
///
/// Clones share the same flag. Cancelling is irreversible.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token (and all of its clones) as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
