//! Change notifications for tracker observers.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::jobs::{ErrorEntry, Job};

/// A state change inside the tracker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TrackerEvent {
    JobAdded { job: Job },
    JobUpdated { job: Job },
    JobRemoved { job_id: String },
    /// A temporary job received its server-assigned id.
    JobPromoted { temp_id: String, job_id: String },
    ErrorAdded { error: ErrorEntry },
    ErrorExpired { error_id: String },
    ErrorsCleared,
    ProcessingStatusChanged { status: Option<String> },
    PollingToggled { enabled: bool },
}

impl TrackerEvent {
    /// Whether the event adds or removes a tracked job id.
    pub fn changes_job_set(&self) -> bool {
        matches!(
            self,
            TrackerEvent::JobAdded { .. }
                | TrackerEvent::JobRemoved { .. }
                | TrackerEvent::JobPromoted { .. }
        )
    }
}

/// Broadcasts tracker events to any number of subscribers.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: Arc<broadcast::Sender<TrackerEvent>>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: TrackerEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
