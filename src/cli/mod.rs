pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{BuildArgs, CliArgs, Commands, PlanArgs, PlanSourceArgs};
pub use output::{OutputFormat, OutputFormatter};
