//! Cooperative cancellation
//!
//! The host hands the engine a [`CancellationToken`]; the engine polls it at
//! every step boundary and before every exported row, so cancellation latency
//! is bounded by one poll interval or one row read, never by a whole table.

use crate::error::{Result, SnapshotError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag checked cooperatively by the engine.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Error out with a cancellation error if the token was cancelled.
    ///
    /// `activity` describes what was in progress, for the error message.
    pub fn ensure_running(&self, activity: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(SnapshotError::cancelled(format!(
                "interrupted while {}",
                activity
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_running() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.ensure_running("anything").is_ok());
    }

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();

        token.cancel();
        assert!(clone.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_ensure_running_yields_cancellation_kind() {
        let token = CancellationToken::new();
        token.cancel();

        let err = token.ensure_running("snapshotting table users").unwrap_err();
        assert!(err.is_cancellation());
        assert!(err.to_string().contains("snapshotting table users"));
    }
}
