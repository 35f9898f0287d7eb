//! Parallel runs: claims keep each product to one worker per attempt.

mod common;

use common::{Script, TestHarness};
use enricher::state::ProcessingStatus;

#[test]
fn test_workers_process_each_product_once() {
    let harness = TestHarness::new(1..=40);
    let mut options = harness.options(3).with_workers(4);
    options.batch_size = 8;

    let summary = harness.orchestrator().run(&options).unwrap();

    assert_eq!(summary.examined, 40);
    assert_eq!(summary.completed, 40);
    assert_eq!(harness.images.total_calls(), 40);
    assert_eq!(harness.descriptions.total_calls(), 40);
    assert_eq!(harness.store.puts(), 40);
    for id in 1..=40 {
        assert_eq!(harness.images.calls_for(&format!("product_{}", id)), 1);
        let state = harness.state(id);
        assert_eq!(state.status, ProcessingStatus::Completed);
        assert_eq!(state.attempt_count, 1);
        assert!(state.claimed_by.is_none());
    }
}

#[test]
fn test_workers_with_failures_match_sequential_outcome() {
    let script = || {
        Script::default()
            .fail_always("product_5")
            .fail_first("product_9", 1)
    };

    let sequential = TestHarness::scripted(1..=12, script(), Script::default());
    for _ in 0..3 {
        sequential.run(3);
    }

    let parallel = TestHarness::scripted(1..=12, script(), Script::default());
    let mut options = parallel.options(3).with_workers(3);
    options.batch_size = 6;
    for _ in 0..3 {
        parallel.orchestrator().run(&options).unwrap();
    }

    assert_eq!(parallel.essentials(), sequential.essentials());
    assert_eq!(
        parallel.state(5).status,
        ProcessingStatus::PermanentlyFailed
    );
    assert_eq!(parallel.images.calls_for("product_5"), 3);
}

#[test]
fn test_workers_respect_record_cap() {
    let harness = TestHarness::new(1..=20);
    let mut options = harness.options(3).with_workers(4).with_max_records(7);
    options.batch_size = 10;

    let summary = harness.orchestrator().run(&options).unwrap();

    assert_eq!(summary.attempted, 7);
    assert_eq!(harness.images.total_calls(), 7);
    let completed = harness
        .states()
        .iter()
        .filter(|s| s.status == ProcessingStatus::Completed)
        .count();
    assert_eq!(completed, 7);
}
