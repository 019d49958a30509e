use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress value at which a run is finished.
pub const COMPLETE_PROGRESS: u8 = 100;

/// One progress report of a long-running job tied to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: String,
    pub project_id: String,
    /// Human-readable name of the current step
    pub step: String,
    /// Percentage in `0..=100`
    pub progress: u8,
    pub created_at: DateTime<Utc>,
}

impl ProgressEvent {
    /// Whether this event ends the run.
    pub fn is_complete(&self) -> bool {
        self.progress >= COMPLETE_PROGRESS
    }
}

/// Signal emitted once when a project's run reaches completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCompletion {
    pub project_id: String,
    /// The event that completed the run
    pub event: ProgressEvent,
}
