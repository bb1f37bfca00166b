//! Cancelling jobs and in-flight uploads.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::JobBackend;
use crate::jobs::{ErrorLog, JobPersistence, JobStatus, JobStore, ProcessingStatus, UpdateOutcome};
use crate::upload::UploadRegistry;

/// How a single cancellation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The backend acknowledged the cancellation.
    Cancelled,
    /// The backend had no record of the job.
    Removed,
    /// The backend call failed; the job was cancelled locally.
    CancelledLocally,
    /// The job had already reached a terminal status.
    AlreadyFinished,
    NotTracked,
}

/// Result of [`CancellationCoordinator::cancel_all_active_jobs`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSummary {
    pub cancelled: Vec<String>,
    pub removed: Vec<String>,
    /// Jobs whose backend cancellation failed. They are also in `cancelled`.
    pub failed: Vec<String>,
    pub uploads_aborted: Vec<String>,
}

pub struct CancellationCoordinator {
    store: Arc<JobStore>,
    status: Arc<ProcessingStatus>,
    errors: Arc<ErrorLog>,
    persistence: JobPersistence,
    registry: Arc<UploadRegistry>,
    backend: Arc<dyn JobBackend>,
}

impl CancellationCoordinator {
    pub fn new(
        store: Arc<JobStore>,
        status: Arc<ProcessingStatus>,
        errors: Arc<ErrorLog>,
        persistence: JobPersistence,
        registry: Arc<UploadRegistry>,
        backend: Arc<dyn JobBackend>,
    ) -> Self {
        Self {
            store,
            status,
            errors,
            persistence,
            registry,
            backend,
        }
    }

    /// Stops every upload and cancels every `running` or `queued` job.
    /// Afterwards each of those jobs is `cancelled` or `removed`.
    pub async fn cancel_all_active_jobs(&self) -> CancelSummary {
        self.status.clear();

        for upload_id in self.registry.active_ids() {
            if let Err(e) = self.persistence.mark_upload_cancelled(&upload_id) {
                warn!(upload_id = %upload_id, "Failed to store cancellation flag: {}", e);
            }
        }
        let mut summary = CancelSummary {
            uploads_aborted: self.registry.abort_all(),
            ..Default::default()
        };

        let active = self.store.active_jobs();
        info!(
            jobs = active.len(),
            uploads = summary.uploads_aborted.len(),
            "Cancelling all active jobs"
        );

        let requests = active.into_iter().map(|job| async move {
            let outcome = self.cancel_tracked(&job.id).await;
            (job.id, outcome)
        });
        for (job_id, outcome) in join_all(requests).await {
            match outcome {
                CancelOutcome::Cancelled => summary.cancelled.push(job_id),
                CancelOutcome::CancelledLocally => {
                    summary.failed.push(job_id.clone());
                    summary.cancelled.push(job_id);
                }
                CancelOutcome::Removed => summary.removed.push(job_id),
                CancelOutcome::AlreadyFinished | CancelOutcome::NotTracked => {}
            }
        }
        summary
    }

    /// Cancels one job with the same outcome policy as cancel-all.
    pub async fn cancel_job(&self, job_id: &str) -> CancelOutcome {
        self.cancel_tracked(job_id).await
    }

    async fn cancel_tracked(&self, job_id: &str) -> CancelOutcome {
        let Some(job) = self.store.get(job_id) else {
            return CancelOutcome::NotTracked;
        };

        match self.store.modify_job(job_id, |job| {
            job.status = JobStatus::Cancelling;
            job.details = "Cancelling...".to_string();
        }) {
            UpdateOutcome::Applied => {}
            UpdateOutcome::Missing => return CancelOutcome::NotTracked,
            _ => return CancelOutcome::AlreadyFinished,
        }

        // Temporary ids exist only on this side.
        if job.is_temporary() {
            self.finish(job_id, "Job cancelled".to_string());
            return CancelOutcome::Cancelled;
        }

        match self.backend.cancel_job(job_id).await {
            Ok(response) => {
                info!(job_id = %job_id, "Job cancelled");
                let details = response
                    .message
                    .unwrap_or_else(|| "Job cancelled".to_string());
                self.finish(job_id, details);
                CancelOutcome::Cancelled
            }
            Err(e) if e.is_not_found() => {
                info!(job_id = %job_id, "Backend no longer knows the job, removing");
                self.store
                    .modify_job(job_id, |job| job.status = JobStatus::Removed);
                CancelOutcome::Removed
            }
            Err(e) => {
                warn!(job_id = %job_id, "Cancel request failed: {}", e);
                self.finish(job_id, "Cancelled locally".to_string());
                self.errors
                    .add_error(format!("Failed to cancel {}: {}", job.name, e));
                CancelOutcome::CancelledLocally
            }
        }
    }

    /// Moves a cancelling job to `cancelled`. A job that reached another
    /// terminal status during the request keeps it.
    fn finish(&self, job_id: &str, details: String) {
        self.store.modify_job(job_id, |job| {
            if job.status.is_terminal() {
                return;
            }
            job.status = JobStatus::Cancelled;
            job.end_time = Some(Utc::now());
            job.details = details;
        });
    }
}
