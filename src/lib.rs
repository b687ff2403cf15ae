//! imageplan - deterministic container image build pipeline
//!
//! A build plan is an ordered list of steps (set a working directory, copy
//! files from the build context, set environment variables, run a delegated
//! command, set the entrypoint). The pipeline applies them strictly in order
//! against a root filesystem, stops at the first failure, and produces an
//! image manifest describing the result.
//!
//! # Example Usage
//!
//! ```no_run
//! use imageplan::context::BuildContext;
//! use imageplan::fs::RealFileSystem;
//! use imageplan::pipeline::BuildPipeline;
//! use imageplan::plan::presets;
//! use imageplan::runner::ProcessRunner;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let context = BuildContext::load("./app")?;
//! let mut pipeline = BuildPipeline::new(
//!     Arc::new(RealFileSystem::rooted("/tmp/rootfs")),
//!     Arc::new(ProcessRunner::new()),
//!     context,
//! );
//!
//! match pipeline.execute(&presets::bean_machine()).await {
//!     Ok(manifest) => println!("{}", manifest),
//!     Err(failure) => std::process::exit(failure.exit_code()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`plan`]: build steps, plan documents, recipe parsing and presets
//! - [`pipeline`]: state machine and sequential step application
//! - [`runner`]: delegated command execution
//! - [`image`]: image state, manifest and layer export
//! - [`context`]: build context scanning and copy source selection

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod fs;
pub mod image;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod runner;
pub mod util;

pub use config::{ConfigError, ImageplanConfig};
pub use error::BuildError;
pub use image::ImageManifest;
pub use pipeline::{BuildFailure, BuildPipeline, PipelineStatus};
pub use plan::{BuildPlan, BuildStep, PlanError, RunOptions};
pub use util::{init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
