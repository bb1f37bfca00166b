//! Periodic status polling for active jobs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{ApiError, JobBackend, JobStatusResponse};
use crate::events::TrackerEvent;
use crate::jobs::{Job, JobStatus, JobStore, UpdateOutcome};

/// Consecutive failures for one job and when it may be polled again.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    failures: u32,
    retry_at: Instant,
}

/// What a single poll cycle did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub checked: usize,
    pub updated: usize,
    pub removed: usize,
    pub failed: usize,
    /// Jobs left out of this cycle because they are backing off.
    pub deferred: usize,
}

pub struct StatusPoller {
    store: Arc<JobStore>,
    backend: Arc<dyn JobBackend>,
    interval: Duration,
    /// Upper bound of the per-job retry delay. `None` retries every cycle.
    backoff_max: Option<Duration>,
    enabled: AtomicBool,
    backoff: Mutex<HashMap<String, Backoff>>,
}

impl StatusPoller {
    pub fn new(
        store: Arc<JobStore>,
        backend: Arc<dyn JobBackend>,
        interval: Duration,
        backoff_max: Option<Duration>,
        enabled: bool,
    ) -> Self {
        Self {
            store,
            backend,
            interval,
            backoff_max: backoff_max.map(|max| max.max(interval)),
            enabled: AtomicBool::new(enabled),
            backoff: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Requests status for every pollable job that is not backing off and
    /// merges the responses into the store.
    pub async fn poll_once(&self) -> PollSummary {
        let now = Instant::now();
        let jobs = self.store.pollable_jobs();
        self.retain_backoff(&jobs);

        let mut summary = PollSummary::default();
        let due: Vec<Job> = jobs
            .into_iter()
            .filter(|job| {
                let ready = self.is_due(&job.id, now);
                if !ready {
                    summary.deferred += 1;
                }
                ready
            })
            .collect();
        if due.is_empty() {
            return summary;
        }

        let requests = due.into_iter().map(|job| async move {
            let result = self.backend.job_status(&job.id).await;
            (job, result)
        });
        for (job, result) in join_all(requests).await {
            summary.checked += 1;
            self.apply(job, result, &mut summary);
        }

        debug!(
            checked = summary.checked,
            updated = summary.updated,
            removed = summary.removed,
            failed = summary.failed,
            deferred = summary.deferred,
            "Poll cycle finished"
        );
        summary
    }

    /// Polls on every tick and whenever the set of tracked jobs changes.
    /// Startup and regained visibility trigger a check even while polling
    /// is switched off.
    pub async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<TrackerEvent>,
        visibility: Arc<Notify>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(interval_ms = self.interval.as_millis() as u64, "Status poller started");
        self.poll_once().await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // skip immediate first tick

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.is_enabled() {
                        self.poll_once().await;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) if event.changes_job_set() => {
                        if self.is_enabled() {
                            self.poll_once().await;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Poller lagged behind tracker events");
                        if self.is_enabled() {
                            self.poll_once().await;
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = visibility.notified() => {
                    info!("Visibility regained, checking job status");
                    self.poll_once().await;
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("Status poller stopped");
    }

    fn apply(
        &self,
        snapshot: Job,
        result: Result<JobStatusResponse, ApiError>,
        summary: &mut PollSummary,
    ) {
        let job_id = snapshot.id.clone();
        let next = match result {
            Ok(response) => {
                self.clear_backoff(&job_id);
                let mut next = snapshot;
                response.apply_to(&mut next);
                next
            }
            Err(e) if e.is_not_found() => {
                self.clear_backoff(&job_id);
                info!(job_id = %job_id, "Backend no longer knows the job, removing");
                let mut next = snapshot;
                next.status = JobStatus::Removed;
                next
            }
            Err(e) => {
                let delay = self.record_failure(&job_id).unwrap_or(self.interval);
                warn!(
                    job_id = %job_id,
                    retry_in_ms = delay.as_millis() as u64,
                    "Status check failed: {}",
                    e
                );
                summary.failed += 1;
                return;
            }
        };

        let removed = next.status == JobStatus::Removed;
        match self.store.update_job(next) {
            UpdateOutcome::Applied if removed => summary.removed += 1,
            UpdateOutcome::Applied => summary.updated += 1,
            outcome => debug!(job_id = %job_id, ?outcome, "Poll response not applied"),
        }
    }

    fn is_due(&self, job_id: &str, now: Instant) -> bool {
        self.lock_backoff()
            .get(job_id)
            .map_or(true, |backoff| backoff.retry_at <= now)
    }

    /// Returns the retry delay, or `None` when backoff is switched off.
    fn record_failure(&self, job_id: &str) -> Option<Duration> {
        let backoff_max = self.backoff_max?;
        let mut backoff = self.lock_backoff();
        let entry = backoff.entry(job_id.to_string()).or_insert(Backoff {
            failures: 0,
            retry_at: Instant::now(),
        });
        entry.failures = entry.failures.saturating_add(1);

        let delay = backoff_delay(self.interval, backoff_max, entry.failures);
        // The regular tick already waits one interval.
        entry.retry_at = Instant::now() + delay.saturating_sub(self.interval);
        Some(delay)
    }

    fn clear_backoff(&self, job_id: &str) {
        self.lock_backoff().remove(job_id);
    }

    /// Forgets backoff state for jobs that are no longer polled.
    fn retain_backoff(&self, jobs: &[Job]) {
        self.lock_backoff()
            .retain(|id, _| jobs.iter().any(|job| &job.id == id));
    }

    fn lock_backoff(&self) -> MutexGuard<'_, HashMap<String, Backoff>> {
        match self.backoff.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Poller backoff lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// `interval * 2^(failures - 1)`, capped at `max`.
fn backoff_delay(interval: Duration, max: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    interval
        .checked_mul(1u32 << exponent)
        .unwrap_or(max)
        .min(max)
}
