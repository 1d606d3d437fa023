//! Instance-scoped pause flag for imports

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{ImportError, ImportResult};

/// Shared pause flag
///
/// Clones observe the same flag. Separate importers get separate gates
/// unless one is handed to both.
#[derive(Debug, Clone, Default)]
pub struct PauseGate {
    paused: Arc<AtomicBool>,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.set_paused(true);
    }

    pub fn resume(&self) {
        self.set_paused(false);
    }

    pub fn set_paused(&self, paused: bool) {
        let previous = self.paused.swap(paused, Ordering::SeqCst);
        if previous != paused {
            tracing::info!(paused, "Import pause state changed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Block until the gate is open, polling every `poll_interval`
    ///
    /// `on_paused` is called once if the gate is closed on entry. Returns
    /// whether any waiting happened. Cancellation while waiting yields
    /// [`ImportError::Cancelled`].
    pub async fn wait_until_resumed(
        &self,
        poll_interval: Duration,
        cancel: &CancellationToken,
        on_paused: impl FnOnce(),
    ) -> ImportResult<bool> {
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        if !self.is_paused() {
            return Ok(false);
        }

        on_paused();

        while self.is_paused() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ImportError::Cancelled),
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        Ok(true)
    }
}
