//! Progress reporting for import calls
//!
//! One [`ProgressSink`] instance receives every update of one top-level
//! import call. [`ImportProgress`] owns the shared completion counter so the
//! reported fraction stays monotonic while items finish concurrently.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use stash_common::events::{EventBus, ProgressState, StashEvent};
use uuid::Uuid;

/// A single progress update
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressNotification {
    pub text: String,
    /// Fraction complete in [0, 1]
    pub progress: f32,
    pub state: ProgressState,
}

impl ProgressNotification {
    pub fn new(text: impl Into<String>, progress: f32, state: ProgressState) -> Self {
        Self {
            text: text.into(),
            progress: progress.clamp(0.0, 1.0),
            state,
        }
    }
}

/// Receiver of progress updates
pub trait ProgressSink: Send + Sync {
    fn update(&self, notification: &ProgressNotification);
}

/// Discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn update(&self, _notification: &ProgressNotification) {}
}

/// Publishes updates as [`StashEvent::ImportProgress`] under one notification id
#[derive(Clone)]
pub struct EventBusSink {
    bus: EventBus,
    notification_id: Uuid,
}

impl EventBusSink {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            notification_id: Uuid::new_v4(),
        }
    }

    pub fn notification_id(&self) -> Uuid {
        self.notification_id
    }
}

impl ProgressSink for EventBusSink {
    fn update(&self, notification: &ProgressNotification) {
        self.bus.emit_lossy(StashEvent::ImportProgress {
            notification_id: self.notification_id,
            text: notification.text.clone(),
            progress: notification.progress,
            state: notification.state,
            timestamp: Utc::now(),
        });
    }
}

#[derive(Debug, Default)]
struct Counters {
    finished: usize,
    imported: usize,
}

/// Progress tracker for one import call
pub struct ImportProgress {
    sink: Arc<dyn ProgressSink>,
    model_name: String,
    total: usize,
    counters: Mutex<Counters>,
}

impl ImportProgress {
    pub fn new(sink: Arc<dyn ProgressSink>, model_name: impl Into<String>, total: usize) -> Self {
        Self {
            sink,
            model_name: model_name.into(),
            total,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn sink(&self) -> &Arc<dyn ProgressSink> {
        &self.sink
    }

    pub fn started(&self) {
        self.sink.update(&ProgressNotification::new(
            "Import is initialising...",
            0.0,
            ProgressState::Active,
        ));
    }

    pub fn paused(&self) {
        let progress = self.fraction();
        self.sink.update(&ProgressNotification::new(
            "Import is paused",
            progress,
            ProgressState::Queued,
        ));
    }

    /// Record one finished item (any outcome) and report the new fraction
    pub fn item_finished(&self, imported: bool, item_name: &str) {
        let notification = {
            let mut counters = match self.counters.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            counters.finished += 1;
            if imported {
                counters.imported += 1;
            }

            // Built under the lock so concurrent finishers report in order
            let notification = ProgressNotification::new(
                format!(
                    "Imported {} of {} {}s ({})",
                    counters.imported, self.total, self.model_name, item_name
                ),
                fraction(counters.finished, self.total),
                ProgressState::Active,
            );
            self.sink.update(&notification);
            notification
        };

        tracing::trace!(progress = notification.progress, "{}", notification.text);
    }

    /// Emit the summary notification and return it
    pub fn finish(&self, cancelled: bool) -> ProgressNotification {
        let imported = match self.counters.lock() {
            Ok(guard) => guard.imported,
            Err(poisoned) => poisoned.into_inner().imported,
        };

        let notification = summarize(&self.model_name, imported, self.total, cancelled);
        self.sink.update(&notification);
        notification
    }

    fn fraction(&self) -> f32 {
        let finished = match self.counters.lock() {
            Ok(guard) => guard.finished,
            Err(poisoned) => poisoned.into_inner().finished,
        };
        fraction(finished, self.total)
    }
}

fn fraction(finished: usize, total: usize) -> f32 {
    if total == 0 {
        1.0
    } else {
        finished as f32 / total as f32
    }
}

/// Summary notification for a finished call
pub fn summarize(model_name: &str, imported: usize, total: usize, cancelled: bool) -> ProgressNotification {
    if cancelled {
        return ProgressNotification::new(
            format!("Import cancelled after {} of {} {}s", imported, total, model_name),
            fraction(imported, total),
            ProgressState::Cancelled,
        );
    }

    if imported == 0 {
        return ProgressNotification::new("Import failed!", 1.0, ProgressState::Cancelled);
    }

    let text = if imported == total {
        format!("Imported {} {}s!", imported, model_name)
    } else {
        format!("Imported {} of {} {}s.", imported, total, model_name)
    };
    ProgressNotification::new(text, 1.0, ProgressState::Completed)
}
