//! Build step definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of a build step, independent of its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    SetWorkdir,
    CopyFiles,
    SetEnv,
    RunCommand,
    SetEntrypoint,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::SetWorkdir => "set_workdir",
            StepKind::CopyFiles => "copy_files",
            StepKind::SetEnv => "set_env",
            StepKind::RunCommand => "run_command",
            StepKind::SetEntrypoint => "set_entrypoint",
        };
        f.pad(name)
    }
}

/// Options handed to the dependency installer of a `run` step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Named dependency groups to exclude from installation
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub without: BTreeSet<String>,
    /// Fail instead of modifying a pre-existing dependency lock
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub frozen: bool,
}

impl RunOptions {
    pub fn frozen() -> Self {
        Self {
            frozen: true,
            ..Default::default()
        }
    }

    pub fn without<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.without.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn is_default(&self) -> bool {
        self.without.is_empty() && !self.frozen
    }

    /// Environment the installer reads its own configuration from
    ///
    /// Groups are joined with `:` the way bundler expects `BUNDLE_WITHOUT`.
    pub fn installer_env(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if self.frozen {
            vars.push(("BUNDLE_FROZEN".to_string(), "true".to_string()));
        }
        if !self.without.is_empty() {
            let groups: Vec<&str> = self.without.iter().map(String::as_str).collect();
            vars.push(("BUNDLE_WITHOUT".to_string(), groups.join(":")));
        }
        vars
    }
}

/// A single ordered action of a build plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStep {
    /// Set the working directory for later steps and the entrypoint
    Workdir(String),
    /// Copy files from the build context into the image
    Copy {
        #[serde(default = "default_copy_source")]
        source: String,
        destination: String,
    },
    /// Insert or overwrite an environment variable
    Env { key: String, value: String },
    /// Execute a delegated command
    Run {
        argv: Vec<String>,
        #[serde(flatten)]
        options: RunOptions,
    },
    /// Record the default command of the image
    Entrypoint(Vec<String>),
}

fn default_copy_source() -> String {
    ".".to_string()
}

impl BuildStep {
    pub fn kind(&self) -> StepKind {
        match self {
            BuildStep::Workdir(_) => StepKind::SetWorkdir,
            BuildStep::Copy { .. } => StepKind::CopyFiles,
            BuildStep::Env { .. } => StepKind::SetEnv,
            BuildStep::Run { .. } => StepKind::RunCommand,
            BuildStep::Entrypoint(_) => StepKind::SetEntrypoint,
        }
    }

    /// Render the step as a single recipe instruction
    pub fn instruction(&self) -> String {
        match self {
            BuildStep::Workdir(path) => format!("WORKDIR {}", path),
            BuildStep::Copy {
                source,
                destination,
            } => format!("COPY {} {}", source, destination),
            BuildStep::Env { key, value } => format!("ENV {}={}", key, quote_env_value(value)),
            BuildStep::Run { argv, options } => {
                let mut line = String::from("RUN ");
                if !options.without.is_empty() {
                    let groups: Vec<&str> = options.without.iter().map(String::as_str).collect();
                    line.push_str(&format!("--without={} ", groups.join(",")));
                }
                if options.frozen {
                    line.push_str("--frozen ");
                }
                line.push_str(&exec_form(argv));
                line
            }
            BuildStep::Entrypoint(argv) => format!("ENTRYPOINT {}", exec_form(argv)),
        }
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.instruction())
    }
}

fn exec_form(argv: &[String]) -> String {
    serde_json::to_string(argv).unwrap_or_else(|_| "[]".to_string())
}

fn quote_env_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '$'));
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$");
    format!("\"{}\"", escaped)
}
