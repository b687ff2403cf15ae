//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{error, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started {
                build_id,
                total_steps,
            } => {
                info!(build = %build_id, steps = total_steps, "Starting build");
            }
            ProgressEvent::StepStarted { index, instruction } => {
                info!(step = index, instruction = %instruction, "Step started");
            }
            ProgressEvent::StepComplete { index, duration } => {
                info!(
                    step = index,
                    duration_ms = duration.as_millis(),
                    "Step complete"
                );
            }
            ProgressEvent::StepFailed {
                index,
                instruction,
                error,
            } => {
                warn!(step = index, instruction = %instruction, error = %error, "Step failed");
            }
            ProgressEvent::Completed {
                total_steps,
                total_time,
            } => {
                info!(
                    steps = total_steps,
                    total_time_ms = total_time.as_millis(),
                    "Build complete"
                );
            }
            ProgressEvent::Failed { error } => {
                error!(error = %error, "Build failed");
            }
        }
    }
}
