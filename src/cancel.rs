//! Cooperative cancellation
//!
//! A `CancellationFlag` is shared between the restore engine, every copy
//! worker and the process interrupt handler. Nothing is aborted forcibly:
//! each party checks the flag at its own loop boundaries and unwinds while
//! keeping whatever it has counted so far.

use crate::error::{DeversionError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Shared, clonable cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    /// Create a flag that is not yet cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Err(Interrupted)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DeversionError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Cancel this flag when the process receives Ctrl-C
    ///
    /// Only one handler can be installed per process.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            if !flag.is_cancelled() {
                warn!("Interrupt received, attempting to exit gracefully...");
            }
            flag.cancel();
        })
        .map_err(|e| DeversionError::InvalidConfiguration(format!("Ctrl-C handler: {}", e)))
    }
}
