//! Client-side tracking of asynchronous ingestion jobs.
//!
//! The tracker keeps an ordered list of jobs (uploads, ingestions, profile
//! runs), mirrors it into a local SQLite key/value store, polls the backend
//! for status, cancels jobs on request and shows short-lived error messages.
//! Everything is owned by a [`JobTracker`] created with
//! [`JobTracker::init`] and stopped with [`JobTracker::teardown`].

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod jobs;
pub mod logging;
pub mod tracker;
pub mod upload;

pub use api::{ApiError, HttpBackend, JobBackend};
pub use config::{load_config, load_config_from_str, TrackerConfig};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, Result, TrackerError};
pub use events::{EventBroadcaster, TrackerEvent};
pub use jobs::{ErrorEntry, Job, JobStatus, JobType, UpdateOutcome};
pub use logging::init_logging;
pub use tracker::{CancelOutcome, CancelSummary, JobTracker, PollSummary};
pub use upload::UploadError;
