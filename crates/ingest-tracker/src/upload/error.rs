//! Upload error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum UploadError {
    /// The upload was cancelled by the user or by cancel-all.
    #[error("Upload {0} was cancelled")]
    Cancelled(String),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    /// The tracker refused to register the upload job.
    #[error("Upload rejected: {0}")]
    Rejected(String),
}

impl UploadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled(_))
    }
}
