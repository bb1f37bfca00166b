//! Job records tracked by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of client-generated ids used before the backend assigns one.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Uploading,
    Running,
    Processing,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Removed,
    Deleted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Uploading => "uploading",
            JobStatus::Running => "running",
            JobStatus::Processing => "processing",
            JobStatus::Cancelling => "cancelling",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Removed => "removed",
            JobStatus::Deleted => "deleted",
        }
    }

    /// Parses a backend status string. Unknown values are treated as running
    /// so the job keeps being polled.
    pub fn parse(s: &str, job_id: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" => JobStatus::Queued,
            "uploading" => JobStatus::Uploading,
            "running" | "in_progress" => JobStatus::Running,
            "processing" => JobStatus::Processing,
            "cancelling" | "canceling" => JobStatus::Cancelling,
            "completed" | "complete" | "success" => JobStatus::Completed,
            "failed" | "error" => JobStatus::Failed,
            "cancelled" | "canceled" => JobStatus::Cancelled,
            "removed" => JobStatus::Removed,
            "deleted" => JobStatus::Deleted,
            other => {
                log::warn!(
                    "Unknown job status '{}' for job {}, defaulting to running",
                    other,
                    job_id
                );
                JobStatus::Running
            }
        }
    }

    /// Statuses the poller checks and cancel-all targets.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::Queued)
    }

    /// Statuses a job never leaves for a non-terminal one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::Failed
                | JobStatus::Cancelled
                | JobStatus::Removed
                | JobStatus::Deleted
        )
    }

    /// Whether a job in this status may be written to local storage.
    pub fn is_persistable(&self) -> bool {
        !matches!(
            self,
            JobStatus::Removed | JobStatus::Deleted | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a job represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    File,
    Database,
    Profile,
    Other(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::File => "file",
            JobType::Database => "database",
            JobType::Profile => "profile",
            JobType::Other(other) => other,
        }
    }
}

impl From<String> for JobType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "file" => JobType::File,
            "database" => JobType::Database,
            "profile" => JobType::Profile,
            _ => JobType::Other(value),
        }
    }
}

impl From<JobType> for String {
    fn from(value: JobType) -> Self {
        match value {
            JobType::File => "file".to_string(),
            JobType::Database => "database".to_string(),
            JobType::Profile => "profile".to_string(),
            JobType::Other(other) => other,
        }
    }
}

/// One asynchronous unit of work: an upload, an ingestion or a profile run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    /// Percent complete, 0 to 100.
    pub progress: u8,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Human-readable status line.
    #[serde(default)]
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default)]
    pub marked_for_removal: bool,
    /// Store revision this snapshot was taken at, 0 when never stored.
    #[serde(default)]
    pub revision: u64,
}

impl Job {
    pub fn new(id: impl Into<String>, name: impl Into<String>, job_type: JobType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            job_type,
            status: JobStatus::Queued,
            progress: 0,
            start_time: Utc::now(),
            end_time: None,
            details: String::new(),
            error: None,
            duration: None,
            marked_for_removal: false,
            revision: 0,
        }
    }

    /// Creates a job under a fresh client-generated id.
    pub fn temporary(name: impl Into<String>, job_type: JobType) -> Self {
        Self::new(
            format!("{}{}", TEMP_ID_PREFIX, uuid::Uuid::new_v4()),
            name,
            job_type,
        )
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn is_temporary(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }

    /// Whether this job may be written to local storage.
    pub fn should_persist(&self) -> bool {
        self.status.is_persistable() && !self.marked_for_removal
    }
}

/// Formats the time between two instants as e.g. `"1h 2m 3s"`, `"4m 5s"`
/// or `"6s"`.
pub fn format_duration(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let total = (end - start).num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
