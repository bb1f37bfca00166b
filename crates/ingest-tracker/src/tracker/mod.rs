//! The job tracker: one explicit context owning the job store, the error
//! log, the processing status and the background tasks acting on them.
//!
//! [`JobTracker::init`] restores persisted state and spawns the status
//! poller and the expiry reaper. [`JobTracker::teardown`] stops both.

mod cancel;
mod poller;
mod reaper;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use cancel::{CancelOutcome, CancelSummary, CancellationCoordinator};
pub use poller::{PollSummary, StatusPoller};
pub use reaper::run_reaper;

use crate::api::{HttpBackend, JobBackend};
use crate::config::TrackerConfig;
use crate::db::Database;
use crate::error::Result;
use crate::events::{EventBroadcaster, TrackerEvent};
use crate::jobs::{
    ErrorEntry, ErrorLog, GracePeriods, Job, JobCounts, JobPersistence, JobStore, JobType,
    ProcessingStatus, UpdateOutcome,
};
use crate::upload::{UploadError, UploadRegistry, Uploader};

pub struct JobTracker {
    config: TrackerConfig,
    store: Arc<JobStore>,
    errors: Arc<ErrorLog>,
    status: Arc<ProcessingStatus>,
    events: EventBroadcaster,
    poller: Arc<StatusPoller>,
    cancellation: CancellationCoordinator,
    uploader: Uploader,
    visibility: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl JobTracker {
    /// Opens the configured database and talks to the configured backend.
    /// Must be called from within a Tokio runtime.
    pub fn open(config: TrackerConfig) -> Result<Self> {
        let path = config.resolved_database_path()?;
        let db = Database::open(&path)?;
        let backend = HttpBackend::new(&config.api_base_url, &config.http, db.clone())?;
        Ok(Self::init(config, db, Arc::new(backend)))
    }

    /// Builds a tracker over `db` and `backend`, restores persisted jobs and
    /// the processing status, and spawns the background tasks. Must be
    /// called from within a Tokio runtime.
    pub fn init(config: TrackerConfig, db: Database, backend: Arc<dyn JobBackend>) -> Self {
        let events = EventBroadcaster::default();
        let persistence = JobPersistence::new(db, &config.namespace);
        let wakeup = Arc::new(Notify::new());

        let store = Arc::new(JobStore::new(
            persistence.clone(),
            events.clone(),
            GracePeriods::from(&config.retention),
            Arc::clone(&wakeup),
        ));
        let errors = Arc::new(ErrorLog::new(
            config.retention.error_ttl(),
            events.clone(),
            Arc::clone(&wakeup),
        ));
        let status = Arc::new(ProcessingStatus::new(persistence.clone(), events.clone()));
        let registry = Arc::new(UploadRegistry::new());

        let loaded = store.load_persisted();
        status.load();

        let poller = Arc::new(StatusPoller::new(
            Arc::clone(&store),
            Arc::clone(&backend),
            config.polling.interval(),
            config.polling.backoff_max(),
            config.polling.enabled,
        ));
        let cancellation = CancellationCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&status),
            Arc::clone(&errors),
            persistence.clone(),
            Arc::clone(&registry),
            Arc::clone(&backend),
        );
        let uploader = Uploader::new(
            Arc::clone(&store),
            Arc::clone(&status),
            Arc::clone(&errors),
            persistence,
            registry,
            backend,
            config.upload.chunk_size_bytes,
        );

        let visibility = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(Arc::clone(&poller).run(
                events.subscribe(),
                Arc::clone(&visibility),
                shutdown_rx.clone(),
            )),
            tokio::spawn(run_reaper(
                Arc::clone(&store),
                Arc::clone(&errors),
                wakeup,
                shutdown_rx,
            )),
        ];

        info!(
            namespace = %config.namespace,
            jobs = loaded,
            "Job tracker initialized"
        );

        Self {
            config,
            store,
            errors,
            status,
            events,
            poller,
            cancellation,
            uploader,
            visibility,
            shutdown_tx,
            tasks,
        }
    }

    /// Stops the background tasks and waits for them to exit.
    pub async fn teardown(mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Tracker task ended abnormally: {}", e);
            }
        }
        info!(namespace = %self.config.namespace, "Job tracker stopped");
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.store.jobs()
    }

    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.store.get(job_id)
    }

    pub fn counts(&self) -> JobCounts {
        self.store.counts()
    }

    pub fn errors(&self) -> Vec<ErrorEntry> {
        self.errors.errors()
    }

    pub fn processing_status(&self) -> Option<String> {
        self.status.get()
    }

    pub fn add_job(&self, job: Job) -> Result<Job> {
        self.store.add_job(job)
    }

    pub fn update_job(&self, job: Job) -> UpdateOutcome {
        self.store.update_job(job)
    }

    pub fn modify_job<F>(&self, job_id: &str, f: F) -> UpdateOutcome
    where
        F: FnOnce(&mut Job),
    {
        self.store.modify_job(job_id, f)
    }

    pub fn remove_job(&self, job_id: &str) -> Option<Job> {
        self.store.remove_job(job_id)
    }

    pub fn promote_job(&self, temp_id: &str, job_id: &str) -> Result<Job> {
        self.store.promote_job(temp_id, job_id)
    }

    pub fn add_error(&self, message: impl Into<String>) -> ErrorEntry {
        self.errors.add_error(message)
    }

    pub fn clear_errors(&self) {
        self.errors.clear_errors();
    }

    pub fn set_processing_status(&self, status: Option<String>) {
        self.status.set(status);
    }

    pub async fn cancel_all_active_jobs(&self) -> CancelSummary {
        self.cancellation.cancel_all_active_jobs().await
    }

    pub async fn cancel_job(&self, job_id: &str) -> CancelOutcome {
        self.cancellation.cancel_job(job_id).await
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_enabled()
    }

    pub fn set_is_polling(&self, enabled: bool) {
        self.poller.set_enabled(enabled);
        self.events.send(TrackerEvent::PollingToggled { enabled });
    }

    /// Runs one status check right away.
    pub async fn poll_now(&self) -> PollSummary {
        self.poller.poll_once().await
    }

    /// Signals that the UI became visible again; triggers a status check.
    pub fn notify_visibility_regained(&self) {
        self.visibility.notify_one();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    pub async fn upload_file(
        &self,
        path: &Path,
        job_type: JobType,
    ) -> std::result::Result<Job, UploadError> {
        self.uploader.upload_file(path, job_type).await
    }

    pub async fn upload_bytes(
        &self,
        file_name: &str,
        job_type: JobType,
        bytes: Vec<u8>,
    ) -> std::result::Result<Job, UploadError> {
        self.uploader.upload_bytes(file_name, job_type, bytes).await
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
