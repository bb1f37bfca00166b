//! Authoritative in-memory job list, mirrored to local storage.
//!
//! Newest jobs come first. Every accepted mutation bumps a store-wide
//! revision counter and rewrites the persisted subset. Jobs that reach a
//! terminal status are marked once and physically dropped by
//! [`JobStore::sweep_expired`] after their grace period.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::RetentionConfig;
use crate::error::TrackerError;
use crate::events::{EventBroadcaster, TrackerEvent};
use crate::jobs::expiry::ExpiryQueue;
use crate::jobs::persistence::JobPersistence;
use crate::jobs::types::{format_duration, Job, JobStatus};

/// Delay between a job turning terminal and its removal.
#[derive(Debug, Clone, Copy)]
pub struct GracePeriods {
    /// For `completed` and `failed`.
    pub completed: Duration,
    /// For `cancelled`, `removed` and `deleted`.
    pub cancelled: Duration,
}

impl GracePeriods {
    pub fn for_status(&self, status: JobStatus) -> Duration {
        match status {
            JobStatus::Cancelled | JobStatus::Removed | JobStatus::Deleted => self.cancelled,
            _ => self.completed,
        }
    }
}

impl From<&RetentionConfig> for GracePeriods {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            completed: config.completed_grace(),
            cancelled: config.cancelled_grace(),
        }
    }
}

impl Default for GracePeriods {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

/// Result of an update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// No job with that id is tracked.
    Missing,
    /// The update was based on an older revision than the stored job.
    Stale,
    /// The job is terminal and the update would reactivate it.
    TerminalLocked,
}

/// Job totals for badges and summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

struct StoreState {
    jobs: Vec<Job>,
    removals: ExpiryQueue<String>,
}

pub struct JobStore {
    state: RwLock<StoreState>,
    persistence: JobPersistence,
    events: EventBroadcaster,
    grace: GracePeriods,
    revision: AtomicU64,
    /// Woken whenever a removal is scheduled.
    wakeup: Arc<Notify>,
}

impl JobStore {
    pub fn new(
        persistence: JobPersistence,
        events: EventBroadcaster,
        grace: GracePeriods,
        wakeup: Arc<Notify>,
    ) -> Self {
        Self {
            state: RwLock::new(StoreState {
                jobs: Vec::new(),
                removals: ExpiryQueue::new(),
            }),
            persistence,
            events,
            grace,
            revision: AtomicU64::new(0),
            wakeup,
        }
    }

    /// Restores persisted jobs into memory. Returns how many were loaded.
    pub fn load_persisted(&self) -> usize {
        let stored = match self.persistence.load_jobs() {
            Ok(jobs) => jobs,
            Err(e) => {
                log::error!("Failed to load persisted jobs: {}", e);
                return 0;
            }
        };

        let mut state = self.write();
        let mut loaded = 0;
        for mut job in stored {
            if state.jobs.iter().any(|j| j.id == job.id) {
                log::warn!("Skipping duplicate stored job {}", job.id);
                continue;
            }
            job.revision = self.next_revision();
            state.jobs.push(job);
            loaded += 1;
        }

        log::info!("Loaded {} jobs from local storage", loaded);
        loaded
    }

    /// Prepends a new job. Ids must be unique among tracked jobs.
    pub fn add_job(&self, mut job: Job) -> Result<Job, TrackerError> {
        let mut state = self.write();
        if state.jobs.iter().any(|j| j.id == job.id) {
            return Err(TrackerError::DuplicateJob(job.id));
        }

        job.progress = job.progress.min(100);
        job.marked_for_removal = false;
        job.revision = self.next_revision();
        if job.status.is_terminal() {
            self.finalize(&mut job, &mut state.removals);
        }

        state.jobs.insert(0, job.clone());
        self.persist(&state.jobs);
        drop(state);

        log::debug!("Tracking job {} ({})", job.id, job.status);
        self.events.send(TrackerEvent::JobAdded { job: job.clone() });
        Ok(job)
    }

    /// Replaces a tracked job. Unknown ids are ignored, as are updates based
    /// on an older revision than the one stored. A record with revision 0 was
    /// never read from the store and always replaces the stored job.
    pub fn update_job(&self, job: Job) -> UpdateOutcome {
        let id = job.id.clone();
        self.commit(&id, move |current| {
            if job.revision != 0 && job.revision < current.revision {
                Err(UpdateOutcome::Stale)
            } else {
                Ok(job)
            }
        })
    }

    /// Applies `f` to the current version of a job under the store lock.
    pub fn modify_job<F>(&self, job_id: &str, f: F) -> UpdateOutcome
    where
        F: FnOnce(&mut Job),
    {
        self.commit(job_id, |current| {
            let mut next = current.clone();
            f(&mut next);
            next.id = current.id.clone();
            Ok(next)
        })
    }

    /// Marks a job removed and drops it from memory and storage at once.
    pub fn remove_job(&self, job_id: &str) -> Option<Job> {
        let mut state = self.write();
        let index = state.jobs.iter().position(|j| j.id == job_id)?;

        let mut job = state.jobs.remove(index);
        job.status = JobStatus::Removed;
        job.marked_for_removal = true;
        state.removals.cancel(&job.id);
        self.persist(&state.jobs);
        self.forget(&job.id);
        drop(state);

        log::debug!("Removed job {}", job.id);
        self.events.send(TrackerEvent::JobRemoved {
            job_id: job.id.clone(),
        });
        Some(job)
    }

    /// Re-keys a temporary job under its server-assigned id.
    pub fn promote_job(&self, temp_id: &str, job_id: &str) -> Result<Job, TrackerError> {
        let mut state = self.write();
        if state.jobs.iter().any(|j| j.id == job_id) {
            return Err(TrackerError::DuplicateJob(job_id.to_string()));
        }

        let StoreState { jobs, removals } = &mut *state;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == temp_id)
            .ok_or_else(|| TrackerError::UnknownJob(temp_id.to_string()))?;

        job.id = job_id.to_string();
        job.revision = self.next_revision();
        if job.marked_for_removal {
            removals.cancel(&temp_id.to_string());
            removals.schedule(
                job.id.clone(),
                Instant::now() + self.grace.for_status(job.status),
            );
            self.wakeup.notify_one();
        }
        let promoted = job.clone();

        self.persist(jobs);
        drop(state);

        log::info!("Job {} is now tracked as {}", temp_id, job_id);
        self.events.send(TrackerEvent::JobPromoted {
            temp_id: temp_id.to_string(),
            job_id: job_id.to_string(),
        });
        Ok(promoted)
    }

    /// Drops every marked job whose grace period has elapsed by `now`.
    pub fn sweep_expired(&self, now: Instant) -> Vec<String> {
        let mut state = self.write();
        let due = state.removals.pop_due(now);
        if due.is_empty() {
            return Vec::new();
        }

        let mut removed = Vec::new();
        for id in due {
            if let Some(index) = state
                .jobs
                .iter()
                .position(|j| j.id == id && j.marked_for_removal)
            {
                state.jobs.remove(index);
                removed.push(id);
            }
        }
        if !removed.is_empty() {
            self.persist(&state.jobs);
        }
        drop(state);

        for job_id in &removed {
            log::debug!("Grace period elapsed, dropped job {}", job_id);
            self.events.send(TrackerEvent::JobRemoved {
                job_id: job_id.clone(),
            });
        }
        removed
    }

    pub fn next_expiry(&self) -> Option<Instant> {
        self.read().removals.next_deadline()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.read().jobs.clone()
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.read().jobs.iter().find(|j| j.id == job_id).cloned()
    }

    /// Jobs in `running` or `queued`.
    pub fn active_jobs(&self) -> Vec<Job> {
        self.read()
            .jobs
            .iter()
            .filter(|j| j.status.is_active())
            .cloned()
            .collect()
    }

    /// Active jobs the backend knows about (server-assigned ids only).
    pub fn pollable_jobs(&self) -> Vec<Job> {
        self.read()
            .jobs
            .iter()
            .filter(|j| j.status.is_active() && !j.is_temporary())
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> JobCounts {
        let state = self.read();
        let mut counts = JobCounts {
            total: state.jobs.len(),
            ..Default::default()
        };
        for job in &state.jobs {
            match job.status {
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                status if status.is_active() => counts.active += 1,
                _ => {}
            }
        }
        counts
    }

    fn commit<F>(&self, job_id: &str, build: F) -> UpdateOutcome
    where
        F: FnOnce(&Job) -> Result<Job, UpdateOutcome>,
    {
        let mut state = self.write();
        let Some(index) = state.jobs.iter().position(|j| j.id == job_id) else {
            log::debug!("Ignoring update for untracked job {}", job_id);
            return UpdateOutcome::Missing;
        };

        let current = state.jobs[index].clone();
        let mut next = match build(&current) {
            Ok(next) => next,
            Err(outcome) => {
                log::debug!("Discarding {:?} update for job {}", outcome, job_id);
                return outcome;
            }
        };

        if current.status.is_terminal() && !next.status.is_terminal() {
            log::debug!(
                "Job {} is {}, refusing transition to {}",
                job_id,
                current.status,
                next.status
            );
            return UpdateOutcome::TerminalLocked;
        }

        next.progress = next.progress.min(100);
        if current.status == JobStatus::Running
            && next.status == JobStatus::Running
            && next.progress < current.progress
        {
            next.progress = current.progress;
        }
        if next.status == JobStatus::Completed {
            next.progress = 100;
        }
        next.marked_for_removal = current.marked_for_removal;
        next.revision = self.next_revision();

        let StoreState { jobs, removals } = &mut *state;
        if next.status.is_terminal() && !current.marked_for_removal {
            self.finalize(&mut next, removals);
        }

        jobs[index] = next.clone();
        self.persist(jobs);
        if next.status == JobStatus::Removed {
            self.forget(&next.id);
        }
        drop(state);

        self.events.send(TrackerEvent::JobUpdated { job: next });
        UpdateOutcome::Applied
    }

    /// Stamps end time and duration, marks the job and schedules removal.
    fn finalize(&self, job: &mut Job, removals: &mut ExpiryQueue<String>) {
        let end = *job.end_time.get_or_insert_with(Utc::now);
        if job.duration.is_none() {
            job.duration = Some(format_duration(job.start_time, end));
        }
        job.marked_for_removal = true;

        let grace = self.grace.for_status(job.status);
        removals.schedule(job.id.clone(), Instant::now() + grace);
        self.wakeup.notify_one();

        log::debug!(
            "Job {} is {}, removing in {}ms",
            job.id,
            job.status,
            grace.as_millis()
        );
    }

    fn persist(&self, jobs: &[Job]) {
        if let Err(e) = self.persistence.save_jobs(jobs) {
            log::error!("Failed to persist jobs: {}", e);
        }
    }

    fn forget(&self, job_id: &str) {
        if let Err(e) = self.persistence.forget_job(job_id) {
            log::error!("Failed to drop job {} from local storage: {}", job_id, e);
        }
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
