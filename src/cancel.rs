use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, SpimsphereError};

/// Cooperative cancellation flag shared between a caller and batch jobs.
///
/// Jobs poll it between work chunks; cancelling never interrupts a chunk.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Returns [`SpimsphereError::Cancelled`] once cancelled.
    ///
    /// # Errors
    ///
    /// Fails if [`cancel`](Self::cancel) has been called on any clone.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SpimsphereError::Cancelled)
        } else {
            Ok(())
        }
    }
}
