//! Sequential build pipeline

pub mod orchestrator;
pub mod status;
pub mod steps;

pub use orchestrator::{BuildFailure, BuildPipeline};
pub use status::PipelineStatus;
pub use steps::{apply_step, StepEnv};
