//! Tracker test harness.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ingest_tracker::config::TrackerConfig;
use ingest_tracker::jobs::JobPersistence;
use ingest_tracker::{Database, Job, JobStatus, JobTracker, JobType};

use super::backend::MockBackend;

pub const TEST_BASE_URL: &str = "http://localhost:8000";

/// A tracker over an in-memory database and a mock backend.
pub struct TestHarness {
    pub tracker: JobTracker,
    pub backend: Arc<MockBackend>,
    pub db: Database,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::new(TEST_BASE_URL))
    }

    /// A harness whose periodic polling starts switched off.
    pub fn without_polling() -> Self {
        let mut config = TrackerConfig::new(TEST_BASE_URL);
        config.polling.enabled = false;
        Self::with_config(config)
    }

    pub fn with_config(config: TrackerConfig) -> Self {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        Self::with_database(config, db, MockBackend::new())
    }

    pub fn with_database(config: TrackerConfig, db: Database, backend: Arc<MockBackend>) -> Self {
        let tracker = JobTracker::init(config, db.clone(), backend.clone());
        Self {
            tracker,
            backend,
            db,
        }
    }

    /// Storage view for the tracker's namespace.
    pub fn persistence(&self) -> JobPersistence {
        JobPersistence::new(self.db.clone(), &self.tracker.config().namespace)
    }

    /// Ids currently persisted for the tracker's namespace.
    pub fn stored_ids(&self) -> Vec<String> {
        self.persistence()
            .load_jobs()
            .expect("Failed to load stored jobs")
            .into_iter()
            .map(|job| job.id)
            .collect()
    }

    pub fn status_of(&self, job_id: &str) -> Option<JobStatus> {
        self.tracker.job(job_id).map(|job| job.status)
    }
}

pub fn job(id: &str, status: JobStatus) -> Job {
    Job::new(id, format!("{}.csv", id), JobType::File).with_status(status)
}

/// Lets spawned tasks run. With a paused clock this also auto-advances
/// time by `millis`.
pub async fn settle(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
