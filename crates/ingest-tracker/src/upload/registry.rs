//! In-flight uploads and their abort signals.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

/// Tracks every upload currently transferring data. Each upload owns a
/// watch channel that flips to `true` when it must abort.
#[derive(Default)]
pub struct UploadRegistry {
    uploads: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl UploadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an upload and returns its abort signal.
    pub fn register(&self, upload_id: &str) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.lock().insert(upload_id.to_string(), tx);
        rx
    }

    pub fn finish(&self, upload_id: &str) {
        self.lock().remove(upload_id);
    }

    /// Signals every registered upload to abort. Returns the affected ids.
    pub fn abort_all(&self) -> Vec<String> {
        let uploads = self.lock();
        for tx in uploads.values() {
            let _ = tx.send(true);
        }
        uploads.keys().cloned().collect()
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<bool>>> {
        match self.uploads.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Upload registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
