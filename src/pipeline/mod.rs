//! Pipeline orchestration: stage declarations, dependency ordering and the
//! per-file, per-split incremental executor.

pub mod orchestrator;
pub mod stage;

pub use orchestrator::{Orchestrator, RunOptions, RunSummary};
pub use stage::Stage;

use crate::error::{Result, SpeechsetError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, checked between tasks. Individual backend
/// calls are uncancellable.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Error out at a suspension point once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SpeechsetError::Cancelled)
        } else {
            Ok(())
        }
    }
}
