//! End-to-end scenarios for the tracker facade: job lifecycle, removal
//! grace periods, backend 404 handling, cancel-all and error expiry.

mod common;

use common::{job, settle, Reply, TestHarness};
use ingest_tracker::{JobStatus, TrackerError, UpdateOutcome};

#[tokio::test(start_paused = true)]
async fn temporary_upload_job_is_tracked() {
    let h = TestHarness::new();

    h.tracker
        .add_job(job("temp-1", JobStatus::Uploading).with_progress(0))
        .unwrap();

    let jobs = h.tracker.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, "temp-1");
    assert_eq!(jobs[0].status, JobStatus::Uploading);
    assert_eq!(h.stored_ids(), vec!["temp-1"]);
}

#[tokio::test(start_paused = true)]
async fn completed_job_is_removed_after_grace_period() {
    let h = TestHarness::new();
    h.tracker
        .add_job(job("temp-1", JobStatus::Uploading))
        .unwrap();

    let mut done = h.tracker.job("temp-1").unwrap();
    done.status = JobStatus::Completed;
    done.progress = 100;
    h.tracker.update_job(done);

    let visible = h.tracker.job("temp-1").unwrap();
    assert_eq!(visible.status, JobStatus::Completed);
    assert!(visible.marked_for_removal);
    assert!(visible.duration.is_some());

    settle(4_900).await;
    assert!(h.tracker.job("temp-1").is_some());

    settle(200).await;
    assert!(h.tracker.job("temp-1").is_none());
    assert!(h.stored_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn freshly_built_record_replaces_tracked_job() {
    let h = TestHarness::new();
    h.tracker
        .add_job(job("temp-1", JobStatus::Uploading))
        .unwrap();

    let outcome = h
        .tracker
        .update_job(job("temp-1", JobStatus::Completed).with_progress(100));

    assert_eq!(outcome, UpdateOutcome::Applied);
    let visible = h.tracker.job("temp-1").unwrap();
    assert_eq!(visible.status, JobStatus::Completed);
    assert_eq!(visible.progress, 100);
    assert!(visible.marked_for_removal);

    settle(5_100).await;
    assert!(h.tracker.job("temp-1").is_none());
    assert!(h.stored_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn job_unknown_to_backend_becomes_removed() {
    let h = TestHarness::new();
    h.backend.set_status("job-42", Reply::NotFound);

    h.tracker
        .add_job(job("job-42", JobStatus::Running))
        .unwrap();
    settle(10).await;

    assert_eq!(h.status_of("job-42"), Some(JobStatus::Removed));
    assert!(!h.stored_ids().contains(&"job-42".to_string()));

    settle(3_100).await;
    assert!(h.tracker.job("job-42").is_none());
}

#[tokio::test(start_paused = true)]
async fn cancel_all_with_partial_backend_failure() {
    let h = TestHarness::without_polling();
    h.backend.set_cancel("job-b", Reply::Fail(500));
    h.tracker
        .add_job(job("job-a", JobStatus::Running))
        .unwrap();
    h.tracker
        .add_job(job("job-b", JobStatus::Queued))
        .unwrap();
    h.tracker
        .set_processing_status(Some("Processing job-a".to_string()));

    let summary = h.tracker.cancel_all_active_jobs().await;

    assert_eq!(h.status_of("job-a"), Some(JobStatus::Cancelled));
    assert_eq!(h.status_of("job-b"), Some(JobStatus::Cancelled));
    assert_eq!(summary.failed, vec!["job-b"]);
    assert_eq!(summary.cancelled.len(), 2);
    assert_eq!(h.tracker.errors().len(), 1);
    assert!(h.tracker.processing_status().is_none());
    assert!(h.tracker.job("job-a").unwrap().end_time.is_some());
    assert!(h.stored_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn errors_expire_after_five_seconds() {
    let h = TestHarness::new();

    h.tracker.add_error("Upload failed");
    assert_eq!(h.tracker.errors().len(), 1);

    settle(5_100).await;
    assert!(h.tracker.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn clear_errors_empties_immediately() {
    let h = TestHarness::new();
    h.tracker.add_error("first");
    h.tracker.add_error("second");

    h.tracker.clear_errors();
    assert!(h.tracker.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn duplicate_ids_are_rejected() {
    let h = TestHarness::new();
    h.tracker
        .add_job(job("job-1", JobStatus::Running))
        .unwrap();

    let result = h.tracker.add_job(job("job-1", JobStatus::Queued));

    assert!(matches!(result, Err(TrackerError::DuplicateJob(_))));
    assert_eq!(h.tracker.jobs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_all_leaves_every_active_job_cancelled_or_removed() {
    let h = TestHarness::without_polling();
    let replies = [
        ("job-1", None),
        ("job-2", Some(Reply::NotFound)),
        ("job-3", Some(Reply::Fail(502))),
        ("job-4", None),
        ("job-5", Some(Reply::NotFound)),
    ];
    for (i, (id, reply)) in replies.iter().enumerate() {
        let status = if i % 2 == 0 {
            JobStatus::Running
        } else {
            JobStatus::Queued
        };
        h.tracker.add_job(job(id, status)).unwrap();
        if let Some(reply) = reply {
            h.backend.set_cancel(id, reply.clone());
        }
    }

    let summary = h.tracker.cancel_all_active_jobs().await;

    for (id, _) in replies {
        let status = h.status_of(id).unwrap();
        assert!(
            status == JobStatus::Cancelled || status == JobStatus::Removed,
            "{} ended as {}",
            id,
            status
        );
    }
    assert_eq!(summary.removed.len(), 2);
    assert_eq!(summary.cancelled.len(), 3);
    assert!(h.stored_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn persisted_jobs_never_include_finished_ones() {
    let h = TestHarness::without_polling();
    for id in ["job-1", "job-2", "job-3", "job-4"] {
        h.tracker.add_job(job(id, JobStatus::Running)).unwrap();
    }

    h.tracker
        .modify_job("job-1", |j| j.status = JobStatus::Completed);
    h.tracker
        .modify_job("job-2", |j| j.status = JobStatus::Cancelled);
    h.tracker.remove_job("job-3");

    assert_eq!(h.stored_ids(), vec!["job-4"]);
    for stored in h.persistence().load_jobs().unwrap() {
        assert!(!stored.marked_for_removal);
    }
}
