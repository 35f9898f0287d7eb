use serde::Serialize;

/// What happened to one record during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Terminal, or claimed by another worker. No external calls.
    Skipped,
    Completed,
    Failed,
    PermanentlyFailed,
    /// Exhausted its budget in an earlier run; marked terminal without calls.
    Promoted,
    /// The shutdown flag was set before the record was claimed.
    Interrupted,
    /// `max_records` was reached before the record was claimed.
    CapReached,
    /// The claim was taken over mid-attempt. External calls may have been
    /// made, but the outcome belongs to the new holder.
    Abandoned,
}

impl Outcome {
    /// Whether the run should stop consuming records.
    pub fn stops_run(&self) -> bool {
        matches!(self, Outcome::Interrupted | Outcome::CapReached)
    }
}

/// Tally of one `run` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub examined: usize,
    pub skipped: usize,
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    pub permanently_failed: usize,
    pub abandoned: usize,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Skipped => {
                self.examined += 1;
                self.skipped += 1;
            }
            Outcome::Completed => {
                self.examined += 1;
                self.attempted += 1;
                self.completed += 1;
            }
            Outcome::Failed => {
                self.examined += 1;
                self.attempted += 1;
                self.failed += 1;
            }
            Outcome::PermanentlyFailed => {
                self.examined += 1;
                self.attempted += 1;
                self.permanently_failed += 1;
            }
            Outcome::Promoted => {
                self.examined += 1;
                self.permanently_failed += 1;
            }
            Outcome::Abandoned => {
                self.examined += 1;
                self.abandoned += 1;
            }
            Outcome::Interrupted => self.interrupted = true,
            Outcome::CapReached => {}
        }
    }

    pub fn merge(&mut self, other: &RunSummary) {
        self.examined += other.examined;
        self.skipped += other.skipped;
        self.attempted += other.attempted;
        self.completed += other.completed;
        self.failed += other.failed;
        self.permanently_failed += other.permanently_failed;
        self.abandoned += other.abandoned;
        self.interrupted |= other.interrupted;
    }
}
