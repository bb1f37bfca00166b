//! HTTP implementation of the ingestion backend.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use super::error::ApiError;
use super::types::{
    CancelJobResponse, ChunkUpload, CompleteUploadRequest, JobStatusResponse, UploadResponse,
};
use crate::config::HttpConfig;
use crate::db::{kv_repo, Database};

/// Local storage key holding the bearer token.
pub const TOKEN_KEY: &str = "token";

/// Maximum length of an error body kept in [`ApiError::Status`].
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Operations the tracker needs from the backend.
#[async_trait]
pub trait JobBackend: Send + Sync {
    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError>;

    async fn cancel_job(&self, job_id: &str) -> Result<CancelJobResponse, ApiError>;

    async fn upload_chunk(&self, chunk: ChunkUpload) -> Result<(), ApiError>;

    async fn complete_chunked_upload(
        &self,
        request: &CompleteUploadRequest,
    ) -> Result<UploadResponse, ApiError>;

    async fn upload(
        &self,
        file_name: &str,
        file_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResponse, ApiError>;
}

/// Talks to `{base}/api/datapuur/*` with the token from local storage.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    db: Database,
}

impl HttpBackend {
    pub fn new(base_url: &str, http: &HttpConfig, db: Database) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(http.connect_timeout())
            .timeout(http.request_timeout())
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            db,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/datapuur/{}", self.base_url, path)
    }

    fn token(&self) -> Result<SecretString, ApiError> {
        kv_repo::get_item(&self.db, TOKEN_KEY)?
            .filter(|token| !token.is_empty())
            .map(SecretString::from)
            .ok_or(ApiError::MissingToken)
    }

    /// Sends an authorized request. `subject` names the resource in
    /// [`ApiError::NotFound`].
    async fn execute(&self, request: RequestBuilder, subject: &str) -> Result<Response, ApiError> {
        let token = self.token()?;
        let response = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(subject.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned + Default>(response: Response) -> Result<T, ApiError> {
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl JobBackend for HttpBackend {
    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError> {
        let request = self.client.get(self.url(&format!("job-status/{}", job_id)));
        let response = self.execute(request, job_id).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn cancel_job(&self, job_id: &str) -> Result<CancelJobResponse, ApiError> {
        let request = self.client.post(self.url(&format!("cancel-job/{}", job_id)));
        let response = self.execute(request, job_id).await?;
        Self::decode(response).await
    }

    async fn upload_chunk(&self, chunk: ChunkUpload) -> Result<(), ApiError> {
        let subject = format!("{} chunk {}", chunk.upload_id, chunk.chunk_index);
        let part = file_part(chunk.bytes, &chunk.file_name)?;
        let form = Form::new()
            .text("upload_id", chunk.upload_id)
            .text("chunk_index", chunk.chunk_index.to_string())
            .text("total_chunks", chunk.total_chunks.to_string())
            .text("file_name", chunk.file_name)
            .part("file", part);

        let request = self.client.post(self.url("upload-chunk")).multipart(form);
        self.execute(request, &subject).await?;
        Ok(())
    }

    async fn complete_chunked_upload(
        &self,
        request: &CompleteUploadRequest,
    ) -> Result<UploadResponse, ApiError> {
        let builder = self
            .client
            .post(self.url("complete-chunked-upload"))
            .json(request);
        let response = self.execute(builder, &request.upload_id).await?;
        Self::decode(response).await
    }

    async fn upload(
        &self,
        file_name: &str,
        file_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResponse, ApiError> {
        let form = Form::new()
            .text("file_type", file_type.to_string())
            .part("file", file_part(bytes, file_name)?);

        let request = self.client.post(self.url("upload")).multipart(form);
        let response = self.execute(request, file_name).await?;
        Self::decode(response).await
    }
}

fn file_part(bytes: Vec<u8>, file_name: &str) -> Result<Part, ApiError> {
    let mime = mime_guess::from_path(file_name).first_or_octet_stream();
    Part::bytes(bytes)
        .file_name(file_name.to_string())
        .mime_str(mime.essence_str())
        .map_err(|e| ApiError::Transport(format!("Invalid content type: {}", e)))
}

fn truncate_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}
