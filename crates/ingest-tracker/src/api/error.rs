//! Backend API error types.

use thiserror::Error;

use crate::db::DatabaseError;

/// Errors from talking to the ingestion backend.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The backend has no record of the job (HTTP 404).
    #[error("'{0}' not found on the backend")]
    NotFound(String),

    /// No bearer token is present in local storage.
    #[error("No access token in local storage")]
    MissingToken,

    /// Any other non-success response.
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response.
    #[error("Request failed: {0}")]
    Transport(String),

    /// The response body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Reading the token from local storage failed.
    #[error("Token lookup failed: {0}")]
    Database(#[from] DatabaseError),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}
