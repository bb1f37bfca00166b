//! Background removal of expired jobs and error entries.

use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::jobs::{ErrorLog, JobStore};

/// Sleeps until the earliest pending deadline, then sweeps both the job
/// store and the error log. Woken early whenever a new deadline is added.
pub async fn run_reaper(
    store: Arc<JobStore>,
    errors: Arc<ErrorLog>,
    wakeup: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Expiry reaper started");

    loop {
        let now = Instant::now();
        let jobs = store.sweep_expired(now);
        let expired = errors.sweep_expired(now);
        if !jobs.is_empty() || !expired.is_empty() {
            debug!(jobs = jobs.len(), errors = expired.len(), "Swept expired entries");
        }

        let next = earliest(store.next_expiry(), errors.next_expiry());
        tokio::select! {
            _ = sleep_until(next) => {}
            _ = wakeup.notified() => {}
            _ = shutdown.changed() => break,
        }
    }

    info!("Expiry reaper stopped");
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
