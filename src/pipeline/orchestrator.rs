use super::status::PipelineStatus;
use super::steps::{apply_step, StepEnv};
use crate::context::BuildContext;
use crate::error::BuildError;
use crate::fs::FileSystem;
use crate::image::{snapshot, ImageManifest, ImageState};
use crate::plan::BuildPlan;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::runner::CommandRunner;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A build that stopped before completing its plan
#[derive(Debug)]
pub struct BuildFailure {
    pub error: BuildError,
    /// Index of the step that failed, if a step was running
    pub step: Option<usize>,
    pub instruction: Option<String>,
    /// State reached before the failing step; never valid
    pub manifest: Option<ImageManifest>,
}

impl BuildFailure {
    fn without_step(error: BuildError) -> Self {
        Self {
            error,
            step: None,
            instruction: None,
            manifest: None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.step, &self.instruction) {
            (Some(index), Some(instruction)) => {
                write!(f, "{} (step {}: {})", self.error, index, instruction)
            }
            _ => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for BuildFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Executes one build plan against one image layer
///
/// A pipeline runs exactly once; a second `execute` fails with
/// `BuildError::InvalidState`.
pub struct BuildPipeline {
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn CommandRunner>,
    context: BuildContext,
    progress_handler: Option<Arc<dyn ProgressHandler>>,
    timeout: Option<Duration>,
    status: PipelineStatus,
    build_id: String,
}

impl BuildPipeline {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        runner: Arc<dyn CommandRunner>,
        context: BuildContext,
    ) -> Self {
        Self {
            fs,
            runner,
            context,
            progress_handler: None,
            timeout: None,
            status: PipelineStatus::Pending,
            build_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_progress(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress_handler = Some(handler);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = build_id.into();
        self
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub async fn execute(&mut self, plan: &BuildPlan) -> Result<ImageManifest, BuildFailure> {
        self.transition(PipelineStatus::Running)
            .map_err(BuildFailure::without_step)?;

        let start = Instant::now();
        info!(build = %self.build_id, steps = plan.len(), "Starting build");
        self.emit(ProgressEvent::Started {
            build_id: self.build_id.clone(),
            total_steps: plan.len(),
        });

        let env = StepEnv {
            fs: self.fs.as_ref(),
            context: &self.context,
            runner: self.runner.as_ref(),
            timeout: self.timeout,
        };

        let mut state = ImageState::new();
        let mut failure = None;
        for (index, step) in plan.steps().iter().enumerate() {
            let instruction = step.instruction();
            self.emit(ProgressEvent::StepStarted {
                index,
                instruction: instruction.clone(),
            });

            let step_start = Instant::now();
            match apply_step(state.clone(), index, step, &env).await {
                Ok(next) => {
                    state = next;
                    debug!(step = index, kind = %step.kind(), "Step applied");
                    self.emit(ProgressEvent::StepComplete {
                        index,
                        duration: step_start.elapsed(),
                    });
                }
                Err(error) => {
                    warn!(step = index, instruction = %instruction, error = %error, "Step failed");
                    self.emit(ProgressEvent::StepFailed {
                        index,
                        instruction: instruction.clone(),
                        error: error.to_string(),
                    });
                    failure = Some((index, instruction, error));
                    break;
                }
            }
        }

        if let Some((index, instruction, error)) = failure {
            return Err(self.fail(plan, &state, error, Some((index, instruction))));
        }

        let files = match snapshot(self.fs.as_ref()) {
            Ok(files) => files,
            Err(e) => {
                let error = BuildError::Io(e.context("Failed to snapshot image filesystem"));
                return Err(self.fail(plan, &state, error, None));
            }
        };

        self.transition(PipelineStatus::Succeeded)
            .map_err(BuildFailure::without_step)?;
        info!(
            build = %self.build_id,
            files = files.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Build succeeded"
        );
        self.emit(ProgressEvent::Completed {
            total_steps: plan.len(),
            total_time: start.elapsed(),
        });

        Ok(self.manifest(plan, &state, files))
    }

    fn fail(
        &mut self,
        plan: &BuildPlan,
        state: &ImageState,
        error: BuildError,
        step: Option<(usize, String)>,
    ) -> BuildFailure {
        if let Err(e) = self.transition(PipelineStatus::Failed) {
            return BuildFailure::without_step(e);
        }
        self.emit(ProgressEvent::Failed {
            error: error.to_string(),
        });

        let files = snapshot(self.fs.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to snapshot partial image");
            Vec::new()
        });
        let (index, instruction) = step.unzip();

        BuildFailure {
            error,
            step: index,
            instruction,
            manifest: Some(self.manifest(plan, state, files)),
        }
    }

    fn manifest(
        &self,
        plan: &BuildPlan,
        state: &ImageState,
        files: Vec<crate::image::SnapshotEntry>,
    ) -> ImageManifest {
        ImageManifest::from_state(
            self.build_id.clone(),
            state,
            self.status,
            self.fs.host_path(Path::new("/")),
            files,
        )
        .with_base(plan.base().map(str::to_string))
    }

    fn transition(&mut self, next: PipelineStatus) -> Result<(), BuildError> {
        if !self.status.can_transition_to(next) {
            return Err(BuildError::InvalidState {
                from: self.status,
                to: next,
            });
        }
        debug!(from = %self.status, to = %next, "Pipeline transition");
        self.status = next;
        Ok(())
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress_handler {
            handler.on_progress(&event);
        }
    }
}
