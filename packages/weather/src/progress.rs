//! Progress reporting for the optional downscaling run.
//!
//! Month-by-month work reports through [`ProgressCallback`] so the CLI can
//! render a progress bar while library code and tests stay silent.

use std::sync::Arc;

/// Receives progress updates from long-running operations.
///
/// Implementations must be `Send + Sync` so they can be shared with
/// spawned download tasks.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total units of work.
    fn set_total(&self, total: u64);

    /// Advances progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Updates the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks progress complete with a final message.
    fn finish(&self, msg: String);

    /// Marks progress complete and removes the indicator.
    fn finish_and_clear(&self);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// Shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
