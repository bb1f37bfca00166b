//! Short-lived, user-visible error messages.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use crate::events::{EventBroadcaster, TrackerEvent};
use crate::jobs::expiry::ExpiryQueue;

/// A single error message. Entries are never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

struct LogState {
    entries: Vec<ErrorEntry>,
    expiries: ExpiryQueue<String>,
}

/// Newest-first list of errors, each expiring after a fixed TTL.
pub struct ErrorLog {
    state: RwLock<LogState>,
    ttl: Duration,
    events: EventBroadcaster,
    wakeup: Arc<Notify>,
}

impl ErrorLog {
    pub fn new(ttl: Duration, events: EventBroadcaster, wakeup: Arc<Notify>) -> Self {
        Self {
            state: RwLock::new(LogState {
                entries: Vec::new(),
                expiries: ExpiryQueue::new(),
            }),
            ttl,
            events,
            wakeup,
        }
    }

    pub fn add_error(&self, message: impl Into<String>) -> ErrorEntry {
        let entry = ErrorEntry {
            id: Uuid::new_v4().to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        };

        {
            let mut state = self.write();
            state.entries.insert(0, entry.clone());
            state
                .expiries
                .schedule(entry.id.clone(), Instant::now() + self.ttl);
        }
        self.wakeup.notify_one();

        log::warn!("{}", entry.message);
        self.events.send(TrackerEvent::ErrorAdded {
            error: entry.clone(),
        });
        entry
    }

    pub fn clear_errors(&self) {
        {
            let mut state = self.write();
            state.entries.clear();
            state.expiries = ExpiryQueue::new();
        }
        self.events.send(TrackerEvent::ErrorsCleared);
    }

    pub fn errors(&self) -> Vec<ErrorEntry> {
        self.read().entries.clone()
    }

    /// Drops entries whose TTL has elapsed by `now`.
    pub fn sweep_expired(&self, now: Instant) -> Vec<String> {
        let expired: Vec<String> = {
            let mut state = self.write();
            let due = state.expiries.pop_due(now);
            state.entries.retain(|e| !due.contains(&e.id));
            due
        };

        for error_id in &expired {
            self.events.send(TrackerEvent::ErrorExpired {
                error_id: error_id.clone(),
            });
        }
        expired
    }

    pub fn next_expiry(&self) -> Option<Instant> {
        self.read().expiries.next_deadline()
    }

    fn read(&self) -> RwLockReadGuard<'_, LogState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Error log lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, LogState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Error log lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
