//! Job records, their persistence and the error log.

mod error_log;
mod expiry;
mod persistence;
mod status;
mod store;
mod types;

pub use error_log::{ErrorEntry, ErrorLog};
pub use expiry::ExpiryQueue;
pub use persistence::{is_database_status, JobPersistence};
pub use status::ProcessingStatus;
pub use store::{GracePeriods, JobCounts, JobStore, UpdateOutcome};
pub use types::{format_duration, Job, JobStatus, JobType, TEMP_ID_PREFIX};
