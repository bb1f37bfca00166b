//! Mirrors tracker state into local storage.
//!
//! Layout per namespace:
//! - `<ns>_jobs`: JSON array of persistable jobs
//! - `<ns>_processing_status`: last processing-status message
//! - `<ns>_upload_cancelled_<upload id>`: `"true"` while an upload is cancelled

use crate::db::{kv_repo, Database, DatabaseError};
use crate::jobs::types::Job;

/// Substrings marking a processing-status message as database-related.
/// Such messages are kept in memory only.
const DATABASE_STATUS_MARKERS: &[&str] = &["database", "Database", "db_", "connection"];

/// Returns true if `message` must never be written to storage.
pub fn is_database_status(message: &str) -> bool {
    DATABASE_STATUS_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

#[derive(Clone)]
pub struct JobPersistence {
    db: Database,
    jobs_key: String,
    status_key: String,
    upload_cancelled_prefix: String,
}

impl JobPersistence {
    pub fn new(db: Database, namespace: &str) -> Self {
        Self {
            db,
            jobs_key: format!("{}_jobs", namespace),
            status_key: format!("{}_processing_status", namespace),
            upload_cancelled_prefix: format!("{}_upload_cancelled_", namespace),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn jobs_key(&self) -> &str {
        &self.jobs_key
    }

    /// Writes the persistable subset of `jobs`, preserving order.
    pub fn save_jobs(&self, jobs: &[Job]) -> Result<usize, DatabaseError> {
        let persistable: Vec<&Job> = jobs.iter().filter(|job| job.should_persist()).collect();
        kv_repo::set_json(&self.db, &self.jobs_key, &persistable)?;
        Ok(persistable.len())
    }

    /// Loads stored jobs, skipping entries that fail to parse and
    /// reapplying the persistence filter.
    pub fn load_jobs(&self) -> Result<Vec<Job>, DatabaseError> {
        let raw: Vec<serde_json::Value> = match kv_repo::get_json(&self.db, &self.jobs_key) {
            Ok(Some(values)) => values,
            Ok(None) => return Ok(Vec::new()),
            Err(DatabaseError::Serde { key, source }) => {
                log::warn!("Discarding unreadable job list under '{}': {}", key, source);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut jobs = Vec::with_capacity(raw.len());
        for value in raw {
            match serde_json::from_value::<Job>(value) {
                Ok(job) if job.should_persist() => jobs.push(job),
                Ok(job) => log::debug!(
                    "Skipping stored job {} with status {} on load",
                    job.id,
                    job.status
                ),
                Err(e) => log::warn!("Skipping unreadable stored job: {}", e),
            }
        }
        Ok(jobs)
    }

    /// Drops a single job from the stored list without touching the others.
    pub fn forget_job(&self, job_id: &str) -> Result<bool, DatabaseError> {
        let mut jobs = self.load_jobs()?;
        let before = jobs.len();
        jobs.retain(|job| job.id != job_id);
        if jobs.len() == before {
            return Ok(false);
        }
        kv_repo::set_json(&self.db, &self.jobs_key, &jobs)?;
        Ok(true)
    }

    pub fn load_processing_status(&self) -> Result<Option<String>, DatabaseError> {
        kv_repo::get_item(&self.db, &self.status_key)
    }

    /// Stores the processing-status message. Database-related messages and
    /// `None` clear the stored value instead.
    pub fn save_processing_status(&self, status: Option<&str>) -> Result<(), DatabaseError> {
        match status {
            Some(message) if !is_database_status(message) => {
                kv_repo::set_item(&self.db, &self.status_key, message)
            }
            _ => kv_repo::remove_item(&self.db, &self.status_key).map(|_| ()),
        }
    }

    pub fn mark_upload_cancelled(&self, upload_id: &str) -> Result<(), DatabaseError> {
        kv_repo::set_item(&self.db, &self.upload_key(upload_id), "true")
    }

    pub fn is_upload_cancelled(&self, upload_id: &str) -> Result<bool, DatabaseError> {
        Ok(kv_repo::get_item(&self.db, &self.upload_key(upload_id))?.as_deref() == Some("true"))
    }

    pub fn clear_upload_cancelled(&self, upload_id: &str) -> Result<(), DatabaseError> {
        kv_repo::remove_item(&self.db, &self.upload_key(upload_id)).map(|_| ())
    }

    /// Upload ids that currently carry a cancellation flag.
    pub fn cancelled_upload_ids(&self) -> Result<Vec<String>, DatabaseError> {
        let keys = kv_repo::keys_with_prefix(&self.db, &self.upload_cancelled_prefix)?;
        Ok(keys
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(&self.upload_cancelled_prefix)
                    .map(str::to_string)
            })
            .collect())
    }

    fn upload_key(&self, upload_id: &str) -> String {
        format!("{}{}", self.upload_cancelled_prefix, upload_id)
    }
}
