//! Per-record processing state and its status machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Catalog identifier of a product. Catalog order is ascending id.
pub type ProductId = i64;

/// Lifecycle of a single record.
///
/// ```text
/// pending ──► processing ──► completed
///                 │
///                 ├──► failed ──► processing   (while attempt_count < max_attempts)
///                 └──► permanently_failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    PermanentlyFailed,
}

impl ProcessingStatus {
    pub const ALL: [ProcessingStatus; 5] = [
        ProcessingStatus::Pending,
        ProcessingStatus::Processing,
        ProcessingStatus::Completed,
        ProcessingStatus::Failed,
        ProcessingStatus::PermanentlyFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::PermanentlyFailed => "permanently_failed",
        }
    }

    /// Terminal records are never reprocessed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::Completed | ProcessingStatus::PermanentlyFailed
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        match (self, next) {
            (Pending, Processing) => true,
            (Failed, Processing) => true,
            // An interrupted attempt is reclaimed by a later run.
            (Processing, Processing) => true,
            (Processing, Completed | Failed | PermanentlyFailed) => true,
            // Stale failed rows are promoted when the attempt budget shrinks.
            (Failed, PermanentlyFailed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown processing status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ProcessingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            "permanently_failed" => Ok(ProcessingStatus::PermanentlyFailed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Step currently in flight for a claimed record. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Claimed,
    GeneratingImage,
    GeneratingDescription,
    StoringArtifact,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Claimed => "claimed",
            Phase::GeneratingImage => "generating_image",
            Phase::GeneratingDescription => "generating_description",
            Phase::StoringArtifact => "storing_artifact",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown phase '{0}'")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claimed" => Ok(Phase::Claimed),
            "generating_image" => Ok(Phase::GeneratingImage),
            "generating_description" => Ok(Phase::GeneratingDescription),
            "storing_artifact" => Ok(Phase::StoringArtifact),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

/// The mutable progress document for one product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingState {
    pub id: ProductId,
    pub status: ProcessingStatus,
    pub attempt_count: u32,
    pub image_uri: Option<String>,
    pub description: Option<String>,
    pub last_error: Option<String>,
    pub phase: Option<Phase>,
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessingState {
    pub fn pending(id: ProductId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: ProcessingStatus::Pending,
            attempt_count: 0,
            image_uri: None,
            description: None,
            last_error: None,
            phase: None,
            claimed_by: None,
            created_at: now,
            started_at: None,
            updated_at: now,
            completed_at: None,
        }
    }

    /// `failed` with attempts left.
    pub fn is_retry_eligible(&self, max_attempts: u32) -> bool {
        self.status == ProcessingStatus::Failed && self.attempt_count < max_attempts
    }

    /// Concludes the current attempt successfully.
    pub fn complete(&mut self, image_uri: String, description: String, now: DateTime<Utc>) {
        self.attempt_count += 1;
        self.status = ProcessingStatus::Completed;
        self.image_uri = Some(image_uri);
        self.description = Some(description);
        self.last_error = None;
        self.phase = None;
        self.claimed_by = None;
        self.updated_at = now;
        self.completed_at = Some(now);
    }

    /// Concludes the current attempt with a failure, choosing between
    /// `failed` and `permanently_failed` by the remaining attempt budget.
    pub fn fail(&mut self, error: String, max_attempts: u32, now: DateTime<Utc>) {
        self.attempt_count = (self.attempt_count + 1).min(max_attempts);
        self.status = if self.attempt_count >= max_attempts {
            ProcessingStatus::PermanentlyFailed
        } else {
            ProcessingStatus::Failed
        };
        self.image_uri = None;
        self.description = None;
        self.last_error = Some(error);
        self.phase = None;
        self.claimed_by = None;
        self.updated_at = now;
    }
}
