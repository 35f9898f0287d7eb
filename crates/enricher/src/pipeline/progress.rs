use crate::catalog::ProductRecord;
use crate::state::ProcessingState;

use super::summary::RunSummary;

/// Receives record outcomes as a run progresses. Implementations must not
/// fail the run; the exporter logs its own errors.
pub trait RunObserver: Send + Sync {
    /// Called after a record's outcome has been persisted.
    fn record_concluded(&self, record: &ProductRecord, state: &ProcessingState);

    /// Called once when the run stops, normally or not.
    fn run_finished(&self, summary: &RunSummary);
}

/// No-op observer for runs without snapshots.
pub struct NoopObserver;

impl RunObserver for NoopObserver {
    fn record_concluded(&self, _record: &ProductRecord, _state: &ProcessingState) {}

    fn run_finished(&self, _summary: &RunSummary) {}
}
