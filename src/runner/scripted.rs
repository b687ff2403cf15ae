use super::{CommandRunner, RunRequest};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

/// Runner that replays queued exit codes instead of spawning processes
///
/// Each call pops the next queued code, falling back to the default once the
/// queue is drained. Every request is recorded for later inspection.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    codes: Mutex<VecDeque<i32>>,
    default_code: i32,
    calls: Mutex<Vec<RunRequest>>,
}

impl ScriptedRunner {
    /// Runner where every command succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner where every command exits with `code`
    pub fn always(code: i32) -> Self {
        Self {
            default_code: code,
            ..Self::default()
        }
    }

    pub fn with_codes(codes: impl IntoIterator<Item = i32>) -> Self {
        Self {
            codes: Mutex::new(codes.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RunRequest> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, request: &RunRequest) -> Result<i32> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let code = self
            .codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(self.default_code);

        debug!(command = %request.display_command(), exit_code = code, "Scripted command");
        Ok(code)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
