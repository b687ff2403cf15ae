//! Error taxonomy for build execution

use crate::pipeline::PipelineStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code reported for failures that did not come from a delegated command
pub const GENERIC_FAILURE_EXIT_CODE: i32 = 1;

/// Errors raised while applying a build plan
#[derive(Debug, Error)]
pub enum BuildError {
    /// A required path is occupied by an incompatible filesystem entry
    #[error("Path conflict: {} is occupied by a non-directory entry", path.display())]
    PathConflict { path: PathBuf },

    /// A copy step had nothing to copy
    #[error("Source not found in build context: {source_pattern}")]
    SourceNotFound { source_pattern: String },

    /// A delegated command exited with a non-zero status
    #[error("Step {index} failed with exit code {exit_code}")]
    StepFailed { index: usize, exit_code: i32 },

    /// A path argument was malformed
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The pipeline was asked to make a transition its state machine forbids
    #[error("Invalid pipeline transition: {from} -> {to}")]
    InvalidState {
        from: PipelineStatus,
        to: PipelineStatus,
    },

    /// Filesystem failure while applying a step
    #[error("I/O error: {0:#}")]
    Io(#[from] anyhow::Error),
}

impl BuildError {
    /// Process exit code to report for this error
    ///
    /// Delegated command failures propagate their exit code unchanged.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::StepFailed { exit_code, .. } => *exit_code,
            _ => GENERIC_FAILURE_EXIT_CODE,
        }
    }

    /// Index of the failing step, when the error came from a delegated command
    pub fn step_index(&self) -> Option<usize> {
        match self {
            BuildError::StepFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}
