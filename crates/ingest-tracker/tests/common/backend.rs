//! Scriptable in-memory backend.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use ingest_tracker::api::{
    ApiError, CancelJobResponse, ChunkUpload, CompleteUploadRequest, JobBackend,
    JobStatusResponse, UploadResponse,
};

/// What the backend answers for a job.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(JobStatusResponse),
    NotFound,
    Fail(u16),
}

impl Reply {
    pub fn status(status: &str, progress: f64) -> Self {
        Reply::Status(JobStatusResponse {
            status: status.to_string(),
            progress: Some(progress),
            ..Default::default()
        })
    }
}

#[derive(Default)]
pub struct MockBackend {
    status_replies: Mutex<HashMap<String, Reply>>,
    cancel_replies: Mutex<HashMap<String, Reply>>,
    status_calls: Mutex<Vec<String>>,
    cancel_calls: Mutex<Vec<String>>,
    chunks: Mutex<Vec<usize>>,
    completed_uploads: Mutex<Vec<CompleteUploadRequest>>,
    single_uploads: Mutex<Vec<String>>,
    upload_response: Mutex<UploadResponse>,
    fail_uploads: AtomicBool,
    /// When set, every chunk waits for a permit before returning.
    chunk_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, job_id: &str, reply: Reply) {
        self.status_replies
            .lock()
            .unwrap()
            .insert(job_id.to_string(), reply);
    }

    pub fn set_cancel(&self, job_id: &str, reply: Reply) {
        self.cancel_replies
            .lock()
            .unwrap()
            .insert(job_id.to_string(), reply);
    }

    pub fn set_upload_response(&self, response: UploadResponse) {
        *self.upload_response.lock().unwrap() = response;
    }

    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }

    /// Makes chunk uploads block until the returned gate is notified.
    pub fn gate_chunks(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.chunk_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn status_calls(&self) -> Vec<String> {
        self.status_calls.lock().unwrap().clone()
    }

    pub fn status_call_count(&self, job_id: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == job_id)
            .count()
    }

    pub fn cancel_calls(&self) -> Vec<String> {
        self.cancel_calls.lock().unwrap().clone()
    }

    pub fn chunk_indices(&self) -> Vec<usize> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn completed_uploads(&self) -> Vec<CompleteUploadRequest> {
        self.completed_uploads.lock().unwrap().clone()
    }

    pub fn single_uploads(&self) -> Vec<String> {
        self.single_uploads.lock().unwrap().clone()
    }

    fn upload_result(&self) -> Result<UploadResponse, ApiError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 500,
                body: "storage unavailable".to_string(),
            });
        }
        Ok(self.upload_response.lock().unwrap().clone())
    }
}

fn reply_error(job_id: &str, reply: &Reply) -> Option<ApiError> {
    match reply {
        Reply::Status(_) => None,
        Reply::NotFound => Some(ApiError::NotFound(job_id.to_string())),
        Reply::Fail(status) => Some(ApiError::Status {
            status: *status,
            body: "mock failure".to_string(),
        }),
    }
}

#[async_trait]
impl JobBackend for MockBackend {
    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError> {
        self.status_calls.lock().unwrap().push(job_id.to_string());
        let reply = self
            .status_replies
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .unwrap_or_else(|| Reply::status("running", 0.0));

        match reply {
            Reply::Status(response) => Ok(response),
            other => Err(reply_error(job_id, &other).unwrap()),
        }
    }

    async fn cancel_job(&self, job_id: &str) -> Result<CancelJobResponse, ApiError> {
        self.cancel_calls.lock().unwrap().push(job_id.to_string());
        let reply = self.cancel_replies.lock().unwrap().get(job_id).cloned();
        match reply.and_then(|r| reply_error(job_id, &r)) {
            Some(error) => Err(error),
            None => Ok(CancelJobResponse {
                status: Some("cancelled".to_string()),
                message: None,
            }),
        }
    }

    async fn upload_chunk(&self, chunk: ChunkUpload) -> Result<(), ApiError> {
        self.chunks.lock().unwrap().push(chunk.chunk_index);
        let gate = self.chunk_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("connection reset".to_string()));
        }
        Ok(())
    }

    async fn complete_chunked_upload(
        &self,
        request: &CompleteUploadRequest,
    ) -> Result<UploadResponse, ApiError> {
        self.completed_uploads.lock().unwrap().push(request.clone());
        self.upload_result()
    }

    async fn upload(
        &self,
        file_name: &str,
        _file_type: &str,
        _bytes: Vec<u8>,
    ) -> Result<UploadResponse, ApiError> {
        self.single_uploads
            .lock()
            .unwrap()
            .push(file_name.to_string());
        self.upload_result()
    }
}
