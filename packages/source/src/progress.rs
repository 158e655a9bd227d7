//! Progress reporting for ingest runs.
//!
//! The controller reports through [`ProgressCallback`] so that the binary
//! can render an `indicatif` bar while tests and library callers stay
//! silent with [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a long-running operation.
///
/// Implementations must be `Send + Sync` because updates arrive from
/// blocking worker tasks.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total expected units of work.
    fn set_total(&self, total: u64);

    /// Advances progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Marks progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
