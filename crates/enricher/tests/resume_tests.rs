//! Resume equivalence: a run interrupted after any step, then restarted,
//! ends in the same states as an uninterrupted run.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::harness::{name, Essentials};
use common::{CrashPoint, Script, TestHarness, ALL_CRASH_POINTS};
use enricher::catalog::ProductRecord;
use enricher::pipeline::{RunObserver, RunSummary};
use enricher::state::{Phase, ProcessingState, ProcessingStatus};

const MAX_ATTEMPTS: u32 = 3;

fn harness() -> TestHarness {
    TestHarness::scripted(
        1..=4,
        Script::default()
            .fail_first("product_2", 1)
            .fail_always("product_3"),
        Script::default(),
    )
}

/// Runs until a run attempts nothing.
fn run_to_fixpoint(harness: &TestHarness) {
    for _ in 0..20 {
        if harness.run(MAX_ATTEMPTS).attempted == 0 {
            return;
        }
    }
    panic!("runs did not converge");
}

/// Runs until the armed crash fires. Earlier runs complete normally.
fn run_until_crash(harness: &TestHarness) -> bool {
    (0..MAX_ATTEMPTS).any(|_| harness.run_catching_crash(MAX_ATTEMPTS))
}

fn baseline() -> Vec<Essentials> {
    let harness = harness();
    run_to_fixpoint(&harness);
    harness.essentials()
}

#[test]
fn test_crash_after_each_step_resumes_to_same_states() {
    let expected = baseline();

    for point in ALL_CRASH_POINTS {
        for target in [1, 2, 4] {
            let harness = harness();
            harness.crash.arm(point, &name(target));

            assert!(
                run_until_crash(&harness),
                "no crash injected at {:?} for {}",
                point,
                target
            );
            let interrupted = harness.state(target);
            assert_eq!(interrupted.status, ProcessingStatus::Processing);
            assert!(interrupted.phase.is_some());

            run_to_fixpoint(&harness);

            assert_eq!(
                harness.essentials(),
                expected,
                "diverged after crash at {:?} for {}",
                point,
                target
            );
        }
    }
}

#[test]
fn test_crash_does_not_consume_an_attempt() {
    let harness = harness();
    harness.crash.arm(CrashPoint::AfterDescription, "product_1");

    assert!(harness.run_catching_crash(MAX_ATTEMPTS));
    assert_eq!(harness.state(1).attempt_count, 0);
    assert_eq!(harness.state(1).phase, Some(Phase::GeneratingDescription));

    harness.run(MAX_ATTEMPTS);
    let state = harness.state(1);
    assert_eq!(state.status, ProcessingStatus::Completed);
    assert_eq!(state.attempt_count, 1);
}

#[test]
fn test_crash_after_store_leaves_single_artifact() {
    let harness = harness();
    harness.crash.arm(CrashPoint::AfterStore, "product_4");

    assert!(harness.run_catching_crash(MAX_ATTEMPTS));
    assert_eq!(harness.state(4).phase, Some(Phase::StoringArtifact));
    run_to_fixpoint(&harness);

    let keys: Vec<_> = harness
        .store
        .keys()
        .into_iter()
        .filter(|k| k.contains("product_4"))
        .collect();
    assert_eq!(keys, vec!["images/product_4.png".to_string()]);
    assert_eq!(harness.images.calls_for("product_4"), 2);
}

/// Requests shutdown as soon as the first record concludes.
struct StopAfterFirst {
    shutdown: Arc<AtomicBool>,
}

impl RunObserver for StopAfterFirst {
    fn record_concluded(&self, _record: &ProductRecord, _state: &ProcessingState) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn run_finished(&self, _summary: &RunSummary) {}
}

#[test]
fn test_graceful_shutdown_then_resume() {
    let expected = baseline();
    let harness = harness();

    let orchestrator = harness.orchestrator();
    let observer = Arc::new(StopAfterFirst {
        shutdown: orchestrator.shutdown_handle(),
    });
    let summary = orchestrator
        .with_observer(observer)
        .run(&harness.options(MAX_ATTEMPTS))
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.attempted, 1);
    assert_eq!(harness.states().len(), 1);

    run_to_fixpoint(&harness);
    assert_eq!(harness.essentials(), expected);
}
