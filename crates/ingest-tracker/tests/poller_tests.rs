//! Status poller behaviour: which jobs are polled, how responses merge,
//! failure backoff, the polling switch and out-of-band checks.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use common::{job, settle, MockBackend, Reply, TestHarness};
use ingest_tracker::api::JobStatusResponse;
use ingest_tracker::jobs::{GracePeriods, JobPersistence, JobStore};
use ingest_tracker::tracker::StatusPoller;
use ingest_tracker::{Database, EventBroadcaster, JobStatus};

fn standalone_poller(
    backend: Arc<MockBackend>,
    backoff_max: Option<Duration>,
) -> (StatusPoller, Arc<JobStore>) {
    let db = Database::open_in_memory().unwrap();
    let store = Arc::new(JobStore::new(
        JobPersistence::new(db, "ingestion"),
        EventBroadcaster::default(),
        GracePeriods::default(),
        Arc::new(Notify::new()),
    ));
    let poller = StatusPoller::new(
        Arc::clone(&store),
        backend,
        Duration::from_secs(3),
        backoff_max,
        true,
    );
    (poller, store)
}

#[tokio::test(start_paused = true)]
async fn polls_only_active_jobs_with_server_ids() {
    let h = TestHarness::new();
    h.tracker
        .add_job(job("job-1", JobStatus::Running))
        .unwrap();
    h.tracker
        .add_job(job("temp-2", JobStatus::Running))
        .unwrap();
    h.tracker
        .add_job(job("job-3", JobStatus::Uploading))
        .unwrap();
    h.tracker
        .add_job(job("job-4", JobStatus::Queued))
        .unwrap();

    settle(10).await;

    let mut polled = h.backend.status_calls();
    polled.sort();
    polled.dedup();
    assert_eq!(polled, vec!["job-1", "job-4"]);
}

#[tokio::test(start_paused = true)]
async fn responses_are_merged_into_jobs() {
    let h = TestHarness::new();
    h.backend.set_status(
        "job-1",
        Reply::Status(JobStatusResponse {
            status: "running".to_string(),
            progress: Some(55.0),
            details: Some("Parsing rows".to_string()),
            ..Default::default()
        }),
    );

    h.tracker
        .add_job(job("job-1", JobStatus::Queued))
        .unwrap();
    settle(10).await;

    let polled = h.tracker.job("job-1").unwrap();
    assert_eq!(polled.status, JobStatus::Running);
    assert_eq!(polled.progress, 55);
    assert_eq!(polled.details, "Parsing rows");
}

#[tokio::test(start_paused = true)]
async fn completion_reported_by_backend_schedules_removal() {
    let h = TestHarness::new();
    h.backend
        .set_status("job-1", Reply::status("completed", 100.0));

    h.tracker
        .add_job(job("job-1", JobStatus::Running))
        .unwrap();
    settle(10).await;

    let done = h.tracker.job("job-1").unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.marked_for_removal);

    settle(5_100).await;
    assert!(h.tracker.job("job-1").is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_status_check_leaves_job_untouched() {
    let h = TestHarness::new();
    h.backend.set_status("job-1", Reply::Fail(503));

    h.tracker
        .add_job(job("job-1", JobStatus::Running).with_progress(10))
        .unwrap();
    settle(10).await;

    let unchanged = h.tracker.job("job-1").unwrap();
    assert_eq!(unchanged.status, JobStatus::Running);
    assert_eq!(unchanged.progress, 10);
    assert!(h.tracker.errors().is_empty());
    assert!(h.backend.status_call_count("job-1") >= 1);
}

#[tokio::test(start_paused = true)]
async fn failed_checks_retry_every_cycle_by_default() {
    let backend = MockBackend::new();
    backend.set_status("job-1", Reply::Fail(500));
    let (poller, store) = standalone_poller(Arc::clone(&backend), None);
    store
        .add_job(job("job-1", JobStatus::Running))
        .unwrap();

    for _ in 0..4 {
        let summary = poller.poll_once().await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.deferred, 0);
    }
    assert_eq!(backend.status_call_count("job-1"), 4);
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_back_off_when_enabled() {
    let backend = MockBackend::new();
    backend.set_status("job-1", Reply::Fail(500));
    let (poller, store) =
        standalone_poller(Arc::clone(&backend), Some(Duration::from_secs(60)));
    store
        .add_job(job("job-1", JobStatus::Running))
        .unwrap();

    // First failure retries on the next regular cycle.
    assert_eq!(poller.poll_once().await.failed, 1);
    assert_eq!(poller.poll_once().await.failed, 1);

    // Second failure doubles the delay, skipping one cycle.
    let skipped = poller.poll_once().await;
    assert_eq!(skipped.deferred, 1);
    assert_eq!(skipped.checked, 0);
    assert_eq!(backend.status_call_count("job-1"), 2);

    tokio::time::advance(Duration::from_secs(3)).await;
    backend.set_status("job-1", Reply::status("running", 20.0));
    let recovered = poller.poll_once().await;
    assert_eq!(recovered.updated, 1);

    // Success clears the backoff.
    assert_eq!(poller.poll_once().await.checked, 1);
    assert_eq!(store.get("job-1").unwrap().progress, 20);
}

#[tokio::test(start_paused = true)]
async fn not_found_marks_job_removed_in_summary() {
    let backend = MockBackend::new();
    backend.set_status("job-9", Reply::NotFound);
    let (poller, store) = standalone_poller(backend, None);
    store
        .add_job(job("job-9", JobStatus::Queued))
        .unwrap();

    let summary = poller.poll_once().await;

    assert_eq!(summary.removed, 1);
    assert_eq!(store.get("job-9").unwrap().status, JobStatus::Removed);
}

#[tokio::test(start_paused = true)]
async fn switching_polling_off_stops_periodic_checks() {
    let h = TestHarness::without_polling();
    assert!(!h.tracker.is_polling());
    h.tracker
        .add_job(job("job-1", JobStatus::Running))
        .unwrap();

    // Startup check runs regardless.
    settle(10).await;
    assert_eq!(h.backend.status_call_count("job-1"), 1);

    settle(10_000).await;
    assert_eq!(h.backend.status_call_count("job-1"), 1);

    h.tracker.set_is_polling(true);
    assert!(h.tracker.is_polling());
    settle(3_100).await;
    assert!(h.backend.status_call_count("job-1") >= 2);
}

#[tokio::test(start_paused = true)]
async fn regained_visibility_triggers_a_check() {
    let h = TestHarness::without_polling();
    h.tracker
        .add_job(job("job-1", JobStatus::Running))
        .unwrap();
    settle(10).await;
    let before = h.backend.status_call_count("job-1");

    h.tracker.notify_visibility_regained();
    settle(10).await;

    assert_eq!(h.backend.status_call_count("job-1"), before + 1);
}

#[tokio::test(start_paused = true)]
async fn new_jobs_are_checked_before_the_next_tick() {
    let h = TestHarness::new();
    settle(10).await;
    assert!(h.backend.status_calls().is_empty());

    h.tracker
        .add_job(job("job-1", JobStatus::Queued))
        .unwrap();
    settle(10).await;

    assert_eq!(h.backend.status_call_count("job-1"), 1);
}

#[tokio::test(start_paused = true)]
async fn terminal_jobs_are_not_reactivated_by_late_responses() {
    let h = TestHarness::without_polling();
    h.tracker
        .add_job(job("job-1", JobStatus::Running))
        .unwrap();
    settle(10).await;

    h.tracker
        .modify_job("job-1", |j| j.status = JobStatus::Failed);
    h.backend
        .set_status("job-1", Reply::status("running", 80.0));
    h.tracker.poll_now().await;

    assert_eq!(h.status_of("job-1"), Some(JobStatus::Failed));
}
