//! Upload progress tracker behavior
//!
//! Drives the tracker through its public actions and server signals and
//! checks the snapshots consumers observe.

use chlb_common::events::{Achievement, AchievementError, EventBus, SessionSnapshot, TrackerEvent};
use chlb_upload::models::{ProcessingSignal, UploadOutcome};
use chlb_upload::services::ProcessingStatus;
use chlb_upload::UploadProgressTracker;
use serde_json::json;

fn tracker() -> UploadProgressTracker {
    UploadProgressTracker::new(Some("42".to_string()), EventBus::new(64))
}

fn achievement(id: &str, timestamp: &str) -> Achievement {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("Achievement {}", id),
        "description": "Unlocked during processing",
        "rank": 1,
        "category": "total_fcs",
        "achieved": true,
        "timestamp": timestamp,
    }))
    .unwrap()
}

fn progress(progress: f64, processed: u64, total: u64) -> ProcessingSignal {
    ProcessingSignal::ProgressUpdate {
        progress,
        processed,
        total,
    }
}

fn complete(message: &str, status: Option<&str>) -> ProcessingSignal {
    ProcessingSignal::ProcessingComplete {
        message: message.to_string(),
        status: status.map(str::to_string),
        errors: None,
    }
}

fn assert_exclusive(snapshot: &SessionSnapshot) {
    assert!(
        !(snapshot.is_uploading && snapshot.is_processing),
        "uploading and processing at once: {:?}",
        snapshot
    );
}

#[tokio::test]
async fn test_end_to_end_upload_and_processing() {
    let tracker = tracker();

    // Given: user starts an upload
    tracker.start_upload().await;
    let s = tracker.snapshot().await;
    assert!(s.is_uploading);
    assert!(!s.is_processing);
    assert_eq!(s.progress, 0.0);
    assert_eq!(s.status, "uploading");

    // When: the upload is accepted
    tracker
        .finish_upload("Upload complete. Total songs: 12", UploadOutcome::Success)
        .await;
    let s = tracker.snapshot().await;
    assert!(!s.is_uploading);
    assert_eq!(s.status, "waiting_for_processing");
    assert_eq!(s.message, "Upload complete. Total songs: 12");

    // Then: processing signals drive the session to completion
    tracker.apply_signal(ProcessingSignal::ProcessingStarted).await;
    let s = tracker.snapshot().await;
    assert!(s.is_processing);
    assert_eq!(s.progress, 0.0);
    assert_eq!(s.status, "in_progress");

    tracker.apply_signal(progress(41.0, 5, 12)).await;
    let s = tracker.snapshot().await;
    assert_eq!(s.progress, 41.0);
    assert_eq!(s.message, "Processing song 5 of 12");

    tracker
        .apply_signal(ProcessingSignal::AchievementUnlocked {
            achievement: achievement("a1", "2024-01-01T00:00:00Z"),
        })
        .await;
    let s = tracker.snapshot().await;
    assert_eq!(s.new_achievements.len(), 1);
    assert_eq!(s.new_achievements[0].id, "a1");

    tracker
        .apply_signal(complete("Done", Some("completed")))
        .await;
    let s = tracker.snapshot().await;
    assert!(!s.is_processing);
    assert_eq!(s.progress, 100.0);
    assert!(s.completed);
    assert_eq!(s.message, "Done");
    assert_eq!(s.status, "completed");
    assert!(!s.is_failed());
}

#[tokio::test]
async fn test_duplicate_achievement_keeps_first_arrival() {
    let tracker = tracker();
    tracker.apply_signal(ProcessingSignal::ProcessingStarted).await;

    let first = achievement("a1", "2024-01-01T00:00:00Z");
    let second = achievement("a1", "2024-06-01T12:00:00Z");

    assert!(
        tracker
            .apply_signal(ProcessingSignal::AchievementUnlocked { achievement: first.clone() })
            .await
    );
    assert!(
        !tracker
            .apply_signal(ProcessingSignal::AchievementUnlocked { achievement: second })
            .await
    );

    let s = tracker.snapshot().await;
    assert_eq!(s.new_achievements, vec![first]);
}

#[tokio::test]
async fn test_repeated_ids_keep_first_arrival_order() {
    let tracker = tracker();
    for id in ["b", "a", "b", "c", "a", "c", "d"] {
        tracker
            .apply_signal(ProcessingSignal::AchievementUnlocked {
                achievement: achievement(id, "2024-01-01T00:00:00Z"),
            })
            .await;
    }

    let ids: Vec<String> = tracker
        .snapshot()
        .await
        .new_achievements
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, vec!["b", "a", "c", "d"]);
}

#[tokio::test]
async fn test_terminal_lock_after_completion() {
    let tracker = tracker();
    tracker.apply_signal(ProcessingSignal::ProcessingStarted).await;
    tracker.apply_signal(complete("Done", None)).await;
    let before = tracker.snapshot().await;

    // Given: a completed session
    assert!(before.completed);
    assert_eq!(before.status, "completed");

    // When: late processing signals arrive
    assert!(!tracker.apply_signal(progress(12.0, 1, 8)).await);
    assert!(!tracker.apply_signal(ProcessingSignal::ProcessingStarted).await);
    assert!(
        !tracker
            .apply_signal(ProcessingSignal::ProcessingError {
                message: "late".to_string()
            })
            .await
    );
    tracker
        .finish_upload("late upload result", UploadOutcome::Error)
        .await;

    // Then: nothing moved
    let after = tracker.snapshot().await;
    assert_eq!(after.status, before.status);
    assert_eq!(after.message, before.message);
    assert_eq!(after.progress, before.progress);
    assert!(after.completed);
}

#[tokio::test]
async fn test_terminal_lock_after_failure() {
    let tracker = tracker();
    tracker.start_upload().await;
    tracker.finish_upload("boom", UploadOutcome::Error).await;

    tracker.apply_signal(ProcessingSignal::ProcessingStarted).await;
    tracker.apply_signal(progress(50.0, 4, 8)).await;

    let s = tracker.snapshot().await;
    assert_eq!(s.status, "error");
    assert_eq!(s.message, "boom");
    assert_eq!(s.progress, 0.0);
}

#[tokio::test]
async fn test_achievements_still_accepted_after_completion() {
    let tracker = tracker();
    tracker.apply_signal(ProcessingSignal::ProcessingStarted).await;
    tracker.apply_signal(complete("Done", None)).await;

    assert!(
        tracker
            .apply_signal(ProcessingSignal::AchievementUnlocked {
                achievement: achievement("late", "2024-01-01T00:00:00Z"),
            })
            .await
    );
    let s = tracker.snapshot().await;
    assert_eq!(s.new_achievements.len(), 1);
    assert_eq!(s.status, "completed");
}

#[tokio::test]
async fn test_error_short_circuits_upload() {
    let tracker = tracker();
    tracker.start_upload().await;

    tracker.finish_upload("boom", UploadOutcome::Error).await;

    let s = tracker.snapshot().await;
    assert!(s.completed);
    assert_eq!(s.status, "error");
    assert!(s.is_failed());
    assert!(!s.is_uploading);
    assert!(!s.is_processing);
}

#[tokio::test]
async fn test_processing_error_is_terminal_with_prefix() {
    let tracker = tracker();
    tracker.apply_signal(ProcessingSignal::ProcessingStarted).await;
    tracker
        .apply_signal(ProcessingSignal::ProcessingError {
            message: "Score data is outdated".to_string(),
        })
        .await;

    let s = tracker.snapshot().await;
    assert!(s.completed);
    assert_eq!(s.status, "error");
    assert_eq!(s.message, "Error: Score data is outdated");
}

#[tokio::test]
async fn test_reset_restores_defaults_and_keeps_notifications() {
    let tracker = tracker();
    tracker.start_upload().await;
    tracker.finish_upload("ok", UploadOutcome::Success).await;
    tracker.apply_signal(ProcessingSignal::ProcessingStarted).await;
    tracker.apply_signal(progress(60.0, 6, 10)).await;
    tracker
        .apply_signal(ProcessingSignal::AchievementUnlocked {
            achievement: achievement("a1", "2024-01-01T00:00:00Z"),
        })
        .await;
    tracker
        .apply_signal(ProcessingSignal::AchievementErrors {
            errors: vec![AchievementError {
                id: "a2".to_string(),
                name: "Achievement a2".to_string(),
                error: "constraint violation".to_string(),
            }],
        })
        .await;
    tracker.apply_signal(complete("Done", None)).await;

    tracker.reset_upload_state().await;

    let s = tracker.snapshot().await;
    assert!(!s.is_processing);
    assert!(!s.is_uploading);
    assert!(!s.completed);
    assert_eq!(s.message, "");
    assert_eq!(s.progress, 0.0);
    assert_eq!(s.status, "idle");
    assert_eq!(s.new_achievements.len(), 1);
    assert_eq!(s.achievement_errors.len(), 1);
}

#[tokio::test]
async fn test_phase_exclusivity_over_every_published_snapshot() {
    let tracker = tracker();
    let mut rx = tracker.subscribe();

    tracker.start_upload().await;
    tracker.apply_signal(ProcessingSignal::ProcessingStarted).await;
    tracker.finish_upload("ok", UploadOutcome::Success).await;
    tracker.apply_signal(progress(30.0, 3, 10)).await;
    tracker.start_upload().await;
    tracker.apply_signal(progress(40.0, 4, 10)).await;
    tracker
        .apply_signal(ProcessingSignal::AchievementsProcessing {
            message: "Processing achievements...".to_string(),
        })
        .await;
    tracker.apply_signal(complete("Done", None)).await;
    tracker.reset_upload_state().await;

    let mut seen = 0;
    while let Ok(event) = rx.try_recv() {
        if let TrackerEvent::SessionChanged { snapshot } = event {
            assert_exclusive(&snapshot);
            seen += 1;
        }
    }
    assert!(seen >= 8);
}

#[tokio::test]
async fn test_processing_start_overtakes_upload_response() {
    let tracker = tracker();
    tracker.start_upload().await;

    // The backend starts processing before the upload response arrives
    tracker.apply_signal(ProcessingSignal::ProcessingStarted).await;
    tracker
        .finish_upload("Upload complete. Processing started. Total songs: 3", UploadOutcome::Success)
        .await;

    let s = tracker.snapshot().await;
    assert_eq!(s.status, "in_progress");
    assert!(s.is_processing);
    assert!(!s.is_uploading);
}

#[tokio::test]
async fn test_progress_without_start_joins_processing() {
    let tracker = tracker();
    tracker.finish_upload("ok", UploadOutcome::Success).await;

    tracker.apply_signal(progress(25.0, 2, 8)).await;

    let s = tracker.snapshot().await;
    assert_eq!(s.status, "in_progress");
    assert_eq!(s.progress, 25.0);
}

#[tokio::test]
async fn test_progress_is_clamped_and_nan_ignored() {
    let tracker = tracker();
    tracker.apply_signal(ProcessingSignal::ProcessingStarted).await;

    tracker.apply_signal(progress(180.0, 9, 8)).await;
    assert_eq!(tracker.snapshot().await.progress, 100.0);

    tracker.apply_signal(progress(-5.0, 0, 8)).await;
    assert_eq!(tracker.snapshot().await.progress, 0.0);

    tracker.apply_signal(progress(33.0, 3, 9)).await;
    tracker.apply_signal(progress(f64::NAN, 4, 9)).await;
    let s = tracker.snapshot().await;
    assert_eq!(s.progress, 33.0);
    assert_eq!(s.message, "Processing song 4 of 9");
}

#[tokio::test]
async fn test_achievements_processing_sets_progress_95() {
    let tracker = tracker();
    tracker.apply_signal(ProcessingSignal::ProcessingStarted).await;
    tracker
        .apply_signal(ProcessingSignal::AchievementsProcessing {
            message: "Processing achievements...".to_string(),
        })
        .await;

    let s = tracker.snapshot().await;
    assert_eq!(s.progress, 95.0);
    assert_eq!(s.message, "Processing achievements...");
}

#[tokio::test]
async fn test_completion_with_errors_keeps_backend_status() {
    let tracker = tracker();
    tracker.apply_signal(ProcessingSignal::ProcessingStarted).await;
    tracker
        .apply_signal(ProcessingSignal::ProcessingComplete {
            message: "Processing completed with some achievement errors".to_string(),
            status: Some("completed_with_errors".to_string()),
            errors: Some(vec![AchievementError {
                id: "a9".to_string(),
                name: "Achievement a9".to_string(),
                error: "timeout".to_string(),
            }]),
        })
        .await;

    let s = tracker.snapshot().await;
    assert!(s.completed);
    assert!(!s.is_failed());
    assert_eq!(s.status, "completed_with_errors");
    assert_eq!(s.achievement_errors.len(), 1);
}

#[tokio::test]
async fn test_clear_notifications() {
    let tracker = tracker();
    for id in ["a1", "a2", "a3"] {
        tracker
            .apply_signal(ProcessingSignal::AchievementUnlocked {
                achievement: achievement(id, "2024-01-01T00:00:00Z"),
            })
            .await;
    }

    tracker.clear_achievement("a2").await;
    let ids: Vec<String> = tracker
        .snapshot()
        .await
        .new_achievements
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, vec!["a1", "a3"]);

    tracker.clear_all_notifications().await;
    let s = tracker.snapshot().await;
    assert!(s.new_achievements.is_empty());
    assert!(s.achievement_errors.is_empty());
}

#[tokio::test]
async fn test_late_upload_result_dropped_after_reset() {
    let tracker = tracker();
    let generation = tracker.start_upload().await;

    // User resets while the request is still in flight
    tracker.reset_upload_state().await;

    let applied = tracker
        .finish_upload_if_current(generation, "ok", UploadOutcome::Success)
        .await;
    assert!(!applied);
    assert_eq!(tracker.snapshot().await.status, "idle");
}

#[tokio::test]
async fn test_superseded_upload_result_dropped() {
    let tracker = tracker();
    let first = tracker.start_upload().await;
    let second = tracker.start_upload().await;
    assert_ne!(first, second);

    assert!(
        !tracker
            .finish_upload_if_current(first, "stale failure", UploadOutcome::Error)
            .await
    );
    assert!(
        tracker
            .finish_upload_if_current(second, "ok", UploadOutcome::Success)
            .await
    );
    assert_eq!(tracker.snapshot().await.status, "waiting_for_processing");
}

#[tokio::test]
async fn test_probe_resume_applies_only_while_idle_and_current() {
    let status = ProcessingStatus {
        status: "in_progress".to_string(),
        progress: Some(62.5),
        processed: Some(5),
        total: Some(8),
    };

    // Fresh tracker: resumes
    let tracker = tracker();
    let generation = tracker.generation();
    assert!(tracker.resume_if_current(generation, &status).await);
    let s = tracker.snapshot().await;
    assert!(s.is_processing);
    assert_eq!(s.progress, 62.5);
    assert_eq!(s.message, "Resuming processing...");

    // Probe issued before the user started an upload: dropped
    let tracker = self::tracker();
    let generation = tracker.generation();
    tracker.start_upload().await;
    assert!(!tracker.resume_if_current(generation, &status).await);
    assert_eq!(tracker.snapshot().await.status, "uploading");

    // Inactive job: nothing to resume
    let tracker = self::tracker();
    let done = ProcessingStatus {
        status: "completed".to_string(),
        ..status
    };
    assert!(!tracker.resume_if_current(tracker.generation(), &done).await);
    assert_eq!(tracker.snapshot().await.status, "idle");
}

#[tokio::test]
async fn test_shutdown_ignores_all_mutations() {
    let tracker = tracker();
    tracker.start_upload().await;
    tracker.shutdown();

    assert!(tracker.is_shut_down());
    tracker.finish_upload("ok", UploadOutcome::Success).await;
    assert!(!tracker.apply_signal(ProcessingSignal::ProcessingStarted).await);

    assert_eq!(tracker.snapshot().await.status, "uploading");
}

#[tokio::test]
async fn test_every_change_publishes_one_snapshot() {
    let tracker = tracker();
    let mut rx = tracker.subscribe();

    tracker.start_upload().await;
    // No-op: nothing to clear
    tracker.clear_all_notifications().await;
    tracker.finish_upload("ok", UploadOutcome::Success).await;

    let statuses: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|event| match event {
            TrackerEvent::SessionChanged { snapshot } => Some(snapshot.status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec!["uploading", "waiting_for_processing"]);
}

#[tokio::test]
async fn test_clones_share_one_session() {
    let tracker = tracker();
    let other = tracker.clone();

    other.start_upload().await;
    assert_eq!(tracker.snapshot().await.status, "uploading");
    assert_eq!(tracker.snapshot().await.user_id.as_deref(), Some("42"));
}
