//! Single-shot and chunked uploads, reported through the job store.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::UploadError;
use super::registry::UploadRegistry;
use crate::api::{ApiError, ChunkUpload, CompleteUploadRequest, JobBackend, UploadResponse};
use crate::jobs::{ErrorLog, Job, JobPersistence, JobStatus, JobStore, JobType, ProcessingStatus};

/// Uploads files and tracks each one as a job, starting under a temporary
/// id and promoted to the backend id once the transfer completes.
pub struct Uploader {
    store: Arc<JobStore>,
    status: Arc<ProcessingStatus>,
    errors: Arc<ErrorLog>,
    persistence: JobPersistence,
    registry: Arc<UploadRegistry>,
    backend: Arc<dyn JobBackend>,
    chunk_size: usize,
}

impl Uploader {
    pub fn new(
        store: Arc<JobStore>,
        status: Arc<ProcessingStatus>,
        errors: Arc<ErrorLog>,
        persistence: JobPersistence,
        registry: Arc<UploadRegistry>,
        backend: Arc<dyn JobBackend>,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            status,
            errors,
            persistence,
            registry,
            backend,
            chunk_size: chunk_size.max(1),
        }
    }

    pub async fn upload_file(&self, path: &Path, job_type: JobType) -> Result<Job, UploadError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| UploadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.upload_bytes(&file_name, job_type, bytes).await
    }

    /// Uploads `bytes` as `file_name`. Returns the job as it stands after
    /// the transfer, under its server-assigned id when one was returned.
    pub async fn upload_bytes(
        &self,
        file_name: &str,
        job_type: JobType,
        bytes: Vec<u8>,
    ) -> Result<Job, UploadError> {
        let job = Job::temporary(file_name, job_type.clone())
            .with_status(JobStatus::Uploading)
            .with_details(format!("Uploading {}", file_name));
        let temp_id = job.id.clone();
        self.store
            .add_job(job)
            .map_err(|e| UploadError::Rejected(e.to_string()))?;

        let upload_id = Uuid::new_v4().to_string();
        let mut abort_rx = self.registry.register(&upload_id);
        self.status.set(Some(format!("Uploading {}...", file_name)));
        info!(upload_id = %upload_id, job_id = %temp_id, size = bytes.len(), "Starting upload of {}", file_name);

        let result = self
            .transfer(&temp_id, &upload_id, file_name, &job_type, bytes, &mut abort_rx)
            .await;

        self.registry.finish(&upload_id);
        if let Err(e) = self.persistence.clear_upload_cancelled(&upload_id) {
            warn!(upload_id = %upload_id, "Failed to clear cancellation flag: {}", e);
        }

        match result {
            Ok(response) => Ok(self.complete(&temp_id, file_name, response)),
            Err(e) if e.is_cancelled() => {
                info!(upload_id = %upload_id, "Upload of {} cancelled", file_name);
                self.store.modify_job(&temp_id, |job| {
                    job.status = JobStatus::Cancelled;
                    job.details = "Upload cancelled".to_string();
                });
                Err(e)
            }
            Err(e) => {
                warn!(upload_id = %upload_id, "Upload of {} failed: {}", file_name, e);
                let message = e.to_string();
                self.store.modify_job(&temp_id, |job| {
                    job.status = JobStatus::Failed;
                    job.error = Some(message.clone());
                    job.details = "Upload failed".to_string();
                });
                self.errors
                    .add_error(format!("Upload of {} failed: {}", file_name, message));
                self.release_status();
                Err(e)
            }
        }
    }

    async fn transfer(
        &self,
        temp_id: &str,
        upload_id: &str,
        file_name: &str,
        job_type: &JobType,
        bytes: Vec<u8>,
        abort_rx: &mut watch::Receiver<bool>,
    ) -> Result<UploadResponse, UploadError> {
        if bytes.len() <= self.chunk_size {
            self.ensure_not_cancelled(temp_id, upload_id, abort_rx)?;
            let request = self.backend.upload(file_name, job_type.as_str(), bytes);
            return abortable(upload_id, abort_rx, request).await;
        }

        let total_chunks = bytes.len().div_ceil(self.chunk_size);
        for (index, chunk) in bytes.chunks(self.chunk_size).enumerate() {
            self.ensure_not_cancelled(temp_id, upload_id, abort_rx)?;

            let request = self.backend.upload_chunk(ChunkUpload {
                upload_id: upload_id.to_string(),
                chunk_index: index,
                total_chunks,
                file_name: file_name.to_string(),
                bytes: chunk.to_vec(),
            });
            abortable(upload_id, abort_rx, request).await?;

            let progress = chunk_progress(index, total_chunks);
            self.store.modify_job(temp_id, |job| {
                job.progress = progress;
                job.details = format!("Uploaded chunk {} of {}", index + 1, total_chunks);
            });
            debug!(upload_id = %upload_id, chunk = index + 1, total_chunks, "Chunk uploaded");
        }

        self.ensure_not_cancelled(temp_id, upload_id, abort_rx)?;
        let request = CompleteUploadRequest {
            upload_id: upload_id.to_string(),
            file_name: file_name.to_string(),
            total_chunks,
            file_type: job_type.as_str().to_string(),
        };
        abortable(
            upload_id,
            abort_rx,
            self.backend.complete_chunked_upload(&request),
        )
        .await
    }

    /// Checked before every request. Only signals owned by this upload stop
    /// it: its abort channel, its stored cancellation flag or its job leaving
    /// the uploading state.
    fn ensure_not_cancelled(
        &self,
        temp_id: &str,
        upload_id: &str,
        abort_rx: &watch::Receiver<bool>,
    ) -> Result<(), UploadError> {
        if *abort_rx.borrow() {
            return Err(UploadError::Cancelled(upload_id.to_string()));
        }
        let job_stopped = self.store.get(temp_id).map_or(true, |job| {
            job.status == JobStatus::Cancelling || job.status.is_terminal()
        });
        if job_stopped {
            return Err(UploadError::Cancelled(upload_id.to_string()));
        }
        match self.persistence.is_upload_cancelled(upload_id) {
            Ok(true) => return Err(UploadError::Cancelled(upload_id.to_string())),
            Ok(false) => {}
            Err(e) => warn!(upload_id = %upload_id, "Failed to read cancellation flag: {}", e),
        }
        Ok(())
    }

    /// The processing status is shared by every upload, so it is cleared
    /// only once the last one has finished.
    fn release_status(&self) {
        if self.registry.active_ids().is_empty() {
            self.status.clear();
        }
    }

    fn complete(&self, temp_id: &str, file_name: &str, response: UploadResponse) -> Job {
        self.release_status();

        let (server_id, status) = match (&response.job_id, &response.file_id) {
            (Some(job_id), _) => (Some(job_id.as_str()), JobStatus::Queued),
            (None, Some(file_id)) => (Some(file_id.as_str()), JobStatus::Completed),
            (None, None) => (None, JobStatus::Completed),
        };

        let mut job_id = temp_id.to_string();
        if let Some(server_id) = server_id {
            match self.store.promote_job(temp_id, server_id) {
                Ok(_) => job_id = server_id.to_string(),
                Err(e) => warn!(job_id = %temp_id, "Keeping temporary id: {}", e),
            }
        }

        let details = response
            .message
            .clone()
            .unwrap_or_else(|| format!("Uploaded {}", file_name));
        self.store.modify_job(&job_id, |job| {
            job.status = status;
            job.details = details;
        });
        info!(job_id = %job_id, "Upload of {} finished", file_name);

        self.store.get(&job_id).unwrap_or_else(|| {
            Job::new(job_id.clone(), file_name, JobType::File).with_status(status)
        })
    }
}

/// Runs `request` unless the upload is aborted first.
async fn abortable<T, F>(
    upload_id: &str,
    abort_rx: &mut watch::Receiver<bool>,
    request: F,
) -> Result<T, UploadError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    tokio::select! {
        result = request => result.map_err(UploadError::from),
        Ok(()) = abort_rx.changed() => Err(UploadError::Cancelled(upload_id.to_string())),
    }
}

/// Progress after `index` of `total` chunks, held below 100 until the
/// backend confirms the upload.
fn chunk_progress(index: usize, total: usize) -> u8 {
    (((index + 1) * 100) / total.max(1)).min(99) as u8
}
