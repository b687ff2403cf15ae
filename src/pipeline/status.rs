use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a single build
///
/// `Pending -> Running -> {Succeeded, Failed}`; terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl PipelineStatus {
    pub fn can_transition_to(self, next: PipelineStatus) -> bool {
        matches!(
            (self, next),
            (PipelineStatus::Pending, PipelineStatus::Running)
                | (PipelineStatus::Running, PipelineStatus::Succeeded)
                | (PipelineStatus::Running, PipelineStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStatus::Succeeded | PipelineStatus::Failed)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStatus::Pending => "pending",
            PipelineStatus::Running => "running",
            PipelineStatus::Succeeded => "succeeded",
            PipelineStatus::Failed => "failed",
        };
        f.pad(name)
    }
}
