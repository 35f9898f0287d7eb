//! Behaviour of the enrichment run across repeated invocations.

mod common;

use std::time::{Duration, Instant};

use chrono::Utc;
use common::harness::name;
use common::{Script, TestHarness};
use enricher::db::state_repo;
use enricher::pipeline::RunOptions;
use enricher::state::{Phase, ProcessingState, ProcessingStatus};

const MAX_ATTEMPTS: u32 = 3;

#[test]
fn test_first_run_completes_every_record() {
    let harness = TestHarness::new(1..=5);

    let summary = harness.run(MAX_ATTEMPTS);

    assert_eq!(summary.examined, 5);
    assert_eq!(summary.completed, 5);
    assert_eq!(summary.skipped, 0);
    for state in harness.states() {
        assert_eq!(state.status, ProcessingStatus::Completed);
        assert_eq!(state.attempt_count, 1);
        assert_eq!(
            state.image_uri,
            Some(format!("mem://images/product_{}.png", state.id))
        );
        assert!(state.description.unwrap().starts_with(&name(state.id)));
        assert!(state.last_error.is_none());
        assert!(state.completed_at.is_some());
        assert!(state.started_at.is_some());
    }
    assert_eq!(harness.store.keys().len(), 5);
}

#[test]
fn test_terminal_records_are_skipped_without_calls() {
    let harness = TestHarness::scripted(
        1..=4,
        Script::default().fail_always("product_3"),
        Script::default(),
    );
    for _ in 0..MAX_ATTEMPTS {
        harness.run(MAX_ATTEMPTS);
    }
    let before = harness.states();
    let image_calls = harness.images.total_calls();
    let description_calls = harness.descriptions.total_calls();
    let puts = harness.store.puts();

    let summary = harness.run(MAX_ATTEMPTS);

    assert_eq!(summary.skipped, 4);
    assert_eq!(summary.attempted, 0);
    assert_eq!(harness.images.total_calls(), image_calls);
    assert_eq!(harness.descriptions.total_calls(), description_calls);
    assert_eq!(harness.store.puts(), puts);
    assert_eq!(harness.states(), before);
}

#[test]
fn test_record_recovering_on_third_attempt() {
    // A and C succeed at once; B's image fails on attempts 1 and 2.
    let harness = TestHarness::scripted(
        [1, 2, 3],
        Script::default().fail_first("product_2", 2),
        Script::default(),
    );

    let first = harness.run(MAX_ATTEMPTS);
    assert_eq!(first.completed, 2);
    assert_eq!(first.failed, 1);
    let b = harness.state(2);
    assert_eq!(b.status, ProcessingStatus::Failed);
    assert_eq!(b.attempt_count, 1);
    assert!(b.image_uri.is_none());
    assert!(b
        .last_error
        .as_deref()
        .unwrap()
        .starts_with("image generation failed: image generation returned HTTP 503"));

    harness.run(MAX_ATTEMPTS);
    assert_eq!(harness.state(2).status, ProcessingStatus::Failed);
    assert_eq!(harness.state(2).attempt_count, 2);

    let third = harness.run(MAX_ATTEMPTS);
    assert_eq!(third.completed, 1);
    assert_eq!(third.skipped, 2);

    let b = harness.state(2);
    assert_eq!(b.status, ProcessingStatus::Completed);
    assert_eq!(b.attempt_count, 3);
    assert!(b.last_error.is_none());
    assert!(b.image_uri.is_some());
    assert_eq!(harness.state(1).attempt_count, 1);
    assert_eq!(harness.state(3).attempt_count, 1);
    assert_eq!(harness.images.calls_for("product_1"), 1);
    assert_eq!(harness.images.calls_for("product_2"), 3);
}

#[test]
fn test_record_failing_every_attempt_becomes_permanently_failed() {
    let harness = TestHarness::scripted(
        [1, 2, 3],
        Script::default().fail_always("product_2"),
        Script::default(),
    );

    for _ in 0..MAX_ATTEMPTS {
        harness.run(MAX_ATTEMPTS);
    }

    let b = harness.state(2);
    assert_eq!(b.status, ProcessingStatus::PermanentlyFailed);
    assert_eq!(b.attempt_count, MAX_ATTEMPTS);
    assert!(b.last_error.as_deref().unwrap().contains("(call 3)"));
    assert!(b.image_uri.is_none());
    assert!(b.description.is_none());

    // Terminal: a further run makes no call for it.
    harness.run(MAX_ATTEMPTS);
    assert_eq!(harness.images.calls_for("product_2"), MAX_ATTEMPTS);

    let report = harness.consolidate();
    let row = report.rows.iter().find(|r| r.id == 2).unwrap();
    assert_eq!(row.status(), ProcessingStatus::PermanentlyFailed);
    assert_eq!(row.state.as_ref().unwrap().last_error, b.last_error);
}

#[test]
fn test_attempt_count_never_exceeds_budget() {
    let harness = TestHarness::scripted(
        1..=6,
        Script::default()
            .fail_always("product_1")
            .fail_first("product_2", 1)
            .fail_first("product_3", 2)
            .fail_first("product_4", 3),
        Script::default().fail_first("product_5", 2),
    );

    for _ in 0..6 {
        harness.run(MAX_ATTEMPTS);
        for state in harness.states() {
            assert!(state.attempt_count <= MAX_ATTEMPTS, "{:?}", state);
            let exhausted_by_failure =
                state.attempt_count == MAX_ATTEMPTS && state.last_error.is_some();
            assert_eq!(
                state.status == ProcessingStatus::PermanentlyFailed,
                exhausted_by_failure,
                "{:?}",
                state
            );
        }
    }

    let statuses: Vec<_> = harness.states().iter().map(|s| (s.id, s.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (1, ProcessingStatus::PermanentlyFailed),
            (2, ProcessingStatus::Completed),
            (3, ProcessingStatus::Completed),
            (4, ProcessingStatus::PermanentlyFailed),
            (5, ProcessingStatus::Completed),
            (6, ProcessingStatus::Completed),
        ]
    );
}

#[test]
fn test_description_failure_skips_artifact_write() {
    let harness = TestHarness::scripted(
        [1],
        Script::default(),
        Script::default().fail_always("product_1"),
    );

    harness.run(MAX_ATTEMPTS);

    let state = harness.state(1);
    assert_eq!(state.status, ProcessingStatus::Failed);
    assert!(state
        .last_error
        .as_deref()
        .unwrap()
        .starts_with("description generation failed:"));
    assert_eq!(harness.store.puts(), 0);
}

#[test]
fn test_artifact_failure_is_recorded_against_record() {
    let crash = std::sync::Arc::new(common::CrashSwitch::default());
    let store = common::MemoryStore::new(crash.clone()).failing_under("images/");
    let harness =
        TestHarness::with_store([1, 2], Script::default(), Script::default(), store, crash);

    let summary = harness.run(MAX_ATTEMPTS);

    assert_eq!(summary.failed, 2);
    let state = harness.state(1);
    assert!(state
        .last_error
        .as_deref()
        .unwrap()
        .contains("artifact storage failed"));
    assert!(state.description.is_none());
}

#[test]
fn test_interrupted_attempt_is_resumed_without_consuming_budget() {
    let harness = TestHarness::new([1]);
    let mut stale = ProcessingState::pending(1, Utc::now());
    stale.status = ProcessingStatus::Processing;
    stale.claimed_by = Some("previous-run".to_string());
    stale.phase = Some(Phase::GeneratingDescription);
    stale.attempt_count = 1;
    state_repo::put(&harness.db, &stale).unwrap();

    let summary = harness.run(MAX_ATTEMPTS);

    assert_eq!(summary.completed, 1);
    let state = harness.state(1);
    assert_eq!(state.status, ProcessingStatus::Completed);
    assert_eq!(state.attempt_count, 2);
    assert!(state.claimed_by.is_none());
    assert!(state.phase.is_none());
}

#[test]
fn test_completed_record_cannot_be_overwritten() {
    let harness = TestHarness::new([1]);
    harness.run(MAX_ATTEMPTS);
    let completed = harness.state(1);

    let regressed = ProcessingState::pending(1, Utc::now());
    assert!(!state_repo::put(&harness.db, &regressed).unwrap());
    assert_eq!(harness.state(1), completed);
}

#[test]
fn test_request_delay_spaces_external_calls() {
    let harness = TestHarness::new([1, 2]);
    let options = RunOptions::new(10, MAX_ATTEMPTS, Duration::from_millis(25));

    let start = Instant::now();
    harness.orchestrator().run(&options).unwrap();

    // Six calls (image, description, store per record) with five gaps.
    assert!(start.elapsed() >= Duration::from_millis(125));
}

#[test]
fn test_max_records_spreads_work_across_runs() {
    let harness = TestHarness::new(1..=5);
    let options = harness.options(MAX_ATTEMPTS).with_max_records(2);

    let first = harness.orchestrator().run(&options).unwrap();
    let second = harness.orchestrator().run(&options).unwrap();
    let third = harness.orchestrator().run(&options).unwrap();

    assert_eq!(first.attempted, 2);
    assert_eq!(second.attempted, 2);
    assert_eq!(second.skipped, 2);
    assert_eq!(third.attempted, 1);
    assert!(harness
        .states()
        .iter()
        .all(|s| s.status == ProcessingStatus::Completed));
}

#[test]
fn test_empty_catalog_is_a_no_op() {
    let harness = TestHarness::new(std::iter::empty::<i64>());
    let summary = harness.run(MAX_ATTEMPTS);
    assert_eq!(summary.examined, 0);
    assert!(harness.states().is_empty());
}
