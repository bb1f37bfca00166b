//! Client-side file uploads tracked as jobs.

mod error;
mod registry;
mod uploader;

pub use error::UploadError;
pub use registry::UploadRegistry;
pub use uploader::Uploader;
