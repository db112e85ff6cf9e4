//! Cooperative cancellation for long-running snapshot operations.

use crate::error::{RsmError, RsmResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A clonable stop flag shared by a managed state machine and the snapshot
/// operations it drives.
///
/// Once stopped it stays stopped.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    /// Create a signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Whether the signal has fired.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Return [`RsmError::Stopped`] if the signal has fired.
    pub fn check(&self) -> RsmResult<()> {
        if self.is_stopped() {
            Err(RsmError::Stopped)
        } else {
            Ok(())
        }
    }
}
