//! Client for the ingestion backend.

mod client;
mod error;
mod types;

pub use client::{HttpBackend, JobBackend, TOKEN_KEY};
pub use error::ApiError;
pub use types::{
    CancelJobResponse, ChunkUpload, CompleteUploadRequest, JobStatusResponse, UploadResponse,
};
