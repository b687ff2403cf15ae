//! Progress handler trait and events

use std::time::Duration;

/// Events emitted while a build plan executes
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Build started
    Started { build_id: String, total_steps: usize },

    /// A step is about to be applied
    StepStarted { index: usize, instruction: String },

    /// A step was applied
    StepComplete { index: usize, duration: Duration },

    /// A step aborted the build
    StepFailed {
        index: usize,
        instruction: String,
        error: String,
    },

    /// Build finished successfully
    Completed {
        total_steps: usize,
        total_time: Duration,
    },

    /// Build failed
    Failed { error: String },
}

/// Trait for handling progress events during a build
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {
        // Intentionally empty
    }
}
