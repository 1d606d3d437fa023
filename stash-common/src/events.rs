//! Event types for the stash event system
//!
//! Import progress is published on a broadcast [`EventBus`]. Renderers (CLI,
//! UI bridges) subscribe; the import pipeline only ever emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// State of a progress notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    /// Waiting to start (also used while imports are paused)
    Queued,
    /// Work in progress
    Active,
    /// Finished, at least one item imported
    Completed,
    /// Finished with nothing imported, or aborted by the caller
    Cancelled,
}

impl ProgressState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProgressState::Completed | ProgressState::Cancelled)
    }
}

/// Stash event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StashEvent {
    /// Progress of one top-level import call
    ImportProgress {
        /// Identifies the import call; one notification per call
        notification_id: Uuid,
        text: String,
        /// Fraction complete in [0, 1]
        progress: f32,
        state: ProgressState,
        timestamp: DateTime<Utc>,
    },

    /// A model became visible in the catalog (new or reused)
    ModelImported {
        model_id: Uuid,
        name: String,
        hash: String,
        reused: bool,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast event bus
///
/// Cloning is cheap; all clones publish to the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StashEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<StashEvent> {
        self.tx.subscribe()
    }

    /// Emit an event
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: StashEvent,
    ) -> Result<usize, broadcast::error::SendError<StashEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: StashEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
