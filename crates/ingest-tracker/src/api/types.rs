//! Wire types for the ingestion backend.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::{Job, JobStatus};

/// Body of `GET /api/datapuur/job-status/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl JobStatusResponse {
    /// Merges the response into `job`. Fields absent from the response keep
    /// their current value.
    pub fn apply_to(&self, job: &mut Job) {
        job.status = JobStatus::parse(&self.status, &job.id);
        if let Some(progress) = self.progress {
            job.progress = progress.clamp(0.0, 100.0).round() as u8;
        }
        if let Some(details) = &self.details {
            job.details = details.clone();
        }
        if self.error.is_some() {
            job.error = self.error.clone();
        }
        if let Some(raw) = &self.end_time {
            match parse_timestamp(raw) {
                Some(end_time) => job.end_time = Some(end_time),
                None => log::debug!("Ignoring unparseable end_time '{}' for {}", raw, job.id),
            }
        }
    }
}

/// Accepts RFC 3339 as well as the naive ISO timestamps the backend emits.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Body of `POST /api/datapuur/cancel-job/{id}`. The backend may answer with
/// an empty body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CancelJobResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of a finished upload. `job_id` is set when the backend started an
/// ingestion job for the file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One part of a chunked upload.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub upload_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Body of `POST /api/datapuur/complete-chunked-upload`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompleteUploadRequest {
    pub upload_id: String,
    pub file_name: String,
    pub total_chunks: usize,
    pub file_type: String,
}
