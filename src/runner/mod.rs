//! Delegated command execution
//!
//! The pipeline never interprets what a `run` step does; it hands the argv,
//! environment and working directory to a [`CommandRunner`] and only looks at
//! the exit code that comes back.

pub mod process;
pub mod scripted;

pub use process::ProcessRunner;
pub use scripted::ScriptedRunner;

use crate::plan::RunOptions;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Exit code reported when a command is killed for exceeding its timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when a command could not be started
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// A single delegated command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub argv: Vec<String>,
    /// Image environment at the time of the step
    pub env: BTreeMap<String, String>,
    /// Host directory backing the current workdir
    pub cwd: PathBuf,
    pub options: RunOptions,
    pub timeout: Option<Duration>,
}

impl RunRequest {
    pub fn new(argv: Vec<String>, cwd: PathBuf) -> Self {
        Self {
            argv,
            env: BTreeMap::new(),
            cwd,
            options: RunOptions::default(),
            timeout: None,
        }
    }

    /// Environment the child sees: image env overlaid with installer configuration
    pub fn child_env(&self) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        env.extend(self.options.installer_env());
        env
    }

    pub fn display_command(&self) -> String {
        self.argv.join(" ")
    }
}

/// Executes delegated commands and reports their exit code
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion; `Err` only for failures of the runner itself
    async fn run(&self, request: &RunRequest) -> Result<i32>;

    /// Runner name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_env_overlays_installer_configuration() {
        let mut request = RunRequest::new(vec!["bundle".into(), "install".into()], "/tmp".into());
        request.env.insert("BUNDLE_FROZEN".into(), "false".into());
        request.env.insert("LANG".into(), "C.UTF-8".into());
        request.options = RunOptions::frozen().without(["test", "development"]);

        let env = request.child_env();
        assert_eq!(env["BUNDLE_FROZEN"], "true");
        assert_eq!(env["BUNDLE_WITHOUT"], "development:test");
        assert_eq!(env["LANG"], "C.UTF-8");
        assert!(!request.env.contains_key("BUNDLE_WITHOUT"));
    }

    #[test]
    fn test_display_command() {
        let request = RunRequest::new(vec!["bundle".into(), "install".into()], "/".into());
        assert_eq!(request.display_command(), "bundle install");
    }
}
