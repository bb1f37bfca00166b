//! The single human-readable processing-status message.

use std::sync::RwLock;

use crate::events::{EventBroadcaster, TrackerEvent};
use crate::jobs::persistence::{is_database_status, JobPersistence};

pub struct ProcessingStatus {
    current: RwLock<Option<String>>,
    persistence: JobPersistence,
    events: EventBroadcaster,
}

impl ProcessingStatus {
    pub fn new(persistence: JobPersistence, events: EventBroadcaster) -> Self {
        Self {
            current: RwLock::new(None),
            persistence,
            events,
        }
    }

    /// Restores the last persisted message, if any.
    pub fn load(&self) -> Option<String> {
        let restored = match self.persistence.load_processing_status() {
            Ok(status) => status.filter(|s| !is_database_status(s)),
            Err(e) => {
                log::error!("Failed to load processing status: {}", e);
                None
            }
        };
        *self.write() = restored.clone();
        restored
    }

    pub fn get(&self) -> Option<String> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the message. Database-related messages are held in memory
    /// only and clear the persisted value.
    pub fn set(&self, status: Option<String>) {
        *self.write() = status.clone();

        if let Err(e) = self.persistence.save_processing_status(status.as_deref()) {
            log::error!("Failed to persist processing status: {}", e);
        }
        self.events
            .send(TrackerEvent::ProcessingStatusChanged { status });
    }

    pub fn clear(&self) {
        self.set(None);
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<String>> {
        match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Processing status lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
