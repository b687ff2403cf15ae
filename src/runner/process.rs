use super::{CommandRunner, RunRequest, SPAWN_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Host variables passed to the child unless the image environment sets them
const PASSTHROUGH_VARS: &[&str] = &["PATH", "HOME"];

/// How long output may keep flowing after the command itself has exited
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs commands as host processes with the image root as backing storage
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(request: &RunRequest) -> Result<Command> {
        let (program, args) = request
            .argv
            .split_first()
            .context("Cannot run an empty command")?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&request.cwd)
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for var in PASSTHROUGH_VARS {
            if let Ok(value) = std::env::var(var) {
                cmd.env(var, value);
            }
        }
        cmd.envs(request.child_env());

        Ok(cmd)
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, request: &RunRequest) -> Result<i32> {
        let mut cmd = Self::command(request)?;
        info!(command = %request.display_command(), cwd = %request.cwd.display(), "Running command");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %request.display_command(), error = %e, "Failed to start command");
                return Ok(SPAWN_FAILURE_EXIT_CODE);
            }
        };

        let stdout = child.stdout.take().map(|out| tokio::spawn(forward_lines(out, "stdout")));
        let stderr = child.stderr.take().map(|err| tokio::spawn(forward_lines(err, "stderr")));

        let status = match request.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status.context("Failed to wait for command")?),
                Err(_) => {
                    warn!(
                        command = %request.display_command(),
                        timeout_secs = limit.as_secs(),
                        "Command timed out, killing"
                    );
                    child.kill().await.context("Failed to kill timed out command")?;
                    None
                }
            },
            None => Some(child.wait().await.context("Failed to wait for command")?),
        };

        // Background grandchildren may keep the pipes open past the exit
        let timed_out = status.is_none();
        for mut task in [stdout, stderr].into_iter().flatten() {
            let joined = if timed_out {
                task.abort();
                task.await
            } else {
                match tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        debug!(
                            command = %request.display_command(),
                            "Output still open after exit, detaching"
                        );
                        task.abort();
                        task.await
                    }
                }
            };
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    debug!(error = %e, "Output forwarding task ended abnormally");
                }
            }
        }

        let code = match status {
            Some(status) => exit_code(status),
            None => TIMEOUT_EXIT_CODE,
        };
        debug!(command = %request.display_command(), exit_code = code, "Command finished");
        Ok(code)
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// Log child output line by line; bytes that are not UTF-8 are replaced, never fatal
async fn forward_lines<R: AsyncRead + Unpin>(reader: R, stream: &'static str) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                debug!(stream, "{}", text.trim_end_matches(|c: char| c == '\n' || c == '\r'));
            }
            Err(e) => {
                // Keep the pipe drained so the child never sees EPIPE
                debug!(stream, error = %e, "Failed to read command output, discarding the rest");
                if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
                    debug!(stream, error = %e, "Stopped draining command output");
                }
                break;
            }
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => crate::error::GENERIC_FAILURE_EXIT_CODE,
    }
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or(crate::error::GENERIC_FAILURE_EXIT_CODE)
}
