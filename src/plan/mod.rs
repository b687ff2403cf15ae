//! Build plans: ordered, immutable sequences of build steps
//!
//! A plan can be written directly as a YAML/JSON document, parsed from a
//! Dockerfile-style recipe, or taken from one of the built-in presets.
//!
//! # Example
//!
//! ```
//! use imageplan::plan::{BuildPlan, RunOptions};
//!
//! let plan = BuildPlan::builder()
//!     .workdir("/src/app")
//!     .copy(".", ".")
//!     .env("BUNDLE_FROZEN", "true")
//!     .run(["bundle", "install"], RunOptions::frozen().without(["test"]))
//!     .entrypoint(["python", "./main.py"])
//!     .build();
//!
//! assert_eq!(plan.len(), 5);
//! plan.validate().expect("valid plan");
//! ```

pub mod dockerfile;
pub mod presets;
pub mod step;

pub use dockerfile::DockerfileParser;
pub use step::{BuildStep, RunOptions, StepKind};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Errors produced while loading or validating a plan
#[derive(Debug, Error)]
pub enum PlanError {
    /// Plan file could not be read
    #[error("Failed to read plan {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// YAML document could not be decoded
    #[error("Invalid YAML plan: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON document could not be decoded
    #[error("Invalid JSON plan: {0}")]
    Json(#[from] serde_json::Error),

    /// Recipe line could not be interpreted
    #[error("Dockerfile line {line}: {message}")]
    Dockerfile { line: usize, message: String },

    /// Plan is structurally invalid
    #[error("Step {index} ({kind}) is invalid: {message}")]
    Invalid {
        index: usize,
        kind: StepKind,
        message: String,
    },

    /// Unknown preset name
    #[error("Unknown preset '{0}'. Available presets: {}", presets::PRESET_NAMES.join(", "))]
    UnknownPreset(String),
}

/// Source format of a plan file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    Yaml,
    Json,
    Dockerfile,
}

impl PlanFormat {
    /// Guess the format from a file name
    ///
    /// `*.json` is JSON, `*.yaml`/`*.yml` is YAML, everything else is treated
    /// as a Dockerfile-style recipe (`Dockerfile`, `Containerfile`, `app.Dockerfile`).
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => PlanFormat::Json,
            Some("yaml") | Some("yml") => PlanFormat::Yaml,
            _ => PlanFormat::Dockerfile,
        }
    }
}

/// An ordered, immutable sequence of build steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    /// Base image reference, recorded but never pulled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base: Option<String>,
    steps: Vec<BuildStep>,
}

impl BuildPlan {
    pub fn new(steps: Vec<BuildStep>) -> Self {
        Self { base: None, steps }
    }

    pub fn with_base(base: Option<String>, steps: Vec<BuildStep>) -> Self {
        Self { base, steps }
    }

    pub fn builder() -> PlanBuilder {
        PlanBuilder::default()
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn from_yaml(content: &str) -> Result<Self, PlanError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self, PlanError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_dockerfile(content: &str, shell: &str) -> Result<Self, PlanError> {
        DockerfileParser::new(shell).parse(content)
    }

    /// Load a plan file, choosing the decoder from its name
    pub fn load(path: &Path, shell: &str) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.display().to_string(),
            source,
        })?;

        match PlanFormat::detect(path) {
            PlanFormat::Yaml => Self::from_yaml(&content),
            PlanFormat::Json => Self::from_json(&content),
            PlanFormat::Dockerfile => Self::from_dockerfile(&content, shell),
        }
    }

    /// Check every step's payload before anything is executed
    pub fn validate(&self) -> Result<(), PlanError> {
        for (index, step) in self.steps.iter().enumerate() {
            if let Some(message) = step_problem(step) {
                return Err(PlanError::Invalid {
                    index,
                    kind: step.kind(),
                    message,
                });
            }
        }
        Ok(())
    }

    /// Render the plan as a Dockerfile-style recipe
    pub fn to_dockerfile(&self) -> String {
        let mut out = String::new();
        if let Some(base) = &self.base {
            out.push_str(&format!("FROM {}\n", base));
        }
        for step in &self.steps {
            out.push_str(&step.instruction());
            out.push('\n');
        }
        out
    }
}

fn step_problem(step: &BuildStep) -> Option<String> {
    match step {
        BuildStep::Workdir(path) => {
            if !path.starts_with('/') {
                Some(format!("workdir '{}' must be an absolute path", path))
            } else if path.contains('\0') {
                Some("workdir contains a NUL byte".to_string())
            } else {
                None
            }
        }
        BuildStep::Copy { destination, .. } => {
            if destination.is_empty() {
                Some("copy destination cannot be empty".to_string())
            } else {
                None
            }
        }
        BuildStep::Env { key, .. } => {
            if key.is_empty() {
                Some("environment key cannot be empty".to_string())
            } else if key.contains('=') {
                Some(format!("environment key '{}' cannot contain '='", key))
            } else {
                None
            }
        }
        BuildStep::Run { argv, .. } => {
            if argv.is_empty() || argv[0].is_empty() {
                Some("command argv cannot be empty".to_string())
            } else {
                None
            }
        }
        BuildStep::Entrypoint(argv) => {
            if argv.is_empty() {
                Some("entrypoint argv cannot be empty".to_string())
            } else {
                None
            }
        }
    }
}

impl fmt::Display for BuildPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Build Plan")?;
        writeln!(f, "==========")?;
        if let Some(base) = &self.base {
            writeln!(f, "Base: {}", base)?;
        }
        writeln!(f, "Steps: {}", self.steps.len())?;
        for (index, step) in self.steps.iter().enumerate() {
            writeln!(f, "  [{}] {:<14} {}", index, step.kind(), step.instruction())?;
        }
        Ok(())
    }
}

/// Fluent constructor mirroring the five step operations
#[derive(Debug, Default)]
pub struct PlanBuilder {
    base: Option<String>,
    steps: Vec<BuildStep>,
}

impl PlanBuilder {
    pub fn base(mut self, image: impl Into<String>) -> Self {
        self.base = Some(image.into());
        self
    }

    pub fn workdir(mut self, path: impl Into<String>) -> Self {
        self.steps.push(BuildStep::Workdir(path.into()));
        self
    }

    pub fn copy(mut self, source: impl Into<String>, destination: impl Into<String>) -> Self {
        self.steps.push(BuildStep::Copy {
            source: source.into(),
            destination: destination.into(),
        });
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.steps.push(BuildStep::Env {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn run<I, S>(mut self, argv: I, options: RunOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(BuildStep::Run {
            argv: argv.into_iter().map(Into::into).collect(),
            options,
        });
        self
    }

    pub fn entrypoint<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps
            .push(BuildStep::Entrypoint(argv.into_iter().map(Into::into).collect()));
        self
    }

    pub fn build(self) -> BuildPlan {
        BuildPlan {
            base: self.base,
            steps: self.steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use yare::parameterized;

    #[test]
    fn test_builder_preserves_order() {
        let plan = BuildPlan::builder()
            .env("A", "1")
            .env("A", "2")
            .workdir("/a")
            .build();

        let kinds: Vec<StepKind> = plan.steps().iter().map(|s| s.kind()).collect();
        assert_eq!(
            kinds,
            vec![StepKind::SetEnv, StepKind::SetEnv, StepKind::SetWorkdir]
        );
    }

    #[parameterized(
        relative_workdir = { BuildStep::Workdir("app".into()), "absolute" },
        empty_key = { BuildStep::Env { key: "".into(), value: "x".into() }, "empty" },
        key_with_equals = { BuildStep::Env { key: "A=B".into(), value: "x".into() }, "'='" },
        empty_run = { BuildStep::Run { argv: vec![], options: RunOptions::default() }, "argv" },
        empty_entrypoint = { BuildStep::Entrypoint(vec![]), "entrypoint" },
        empty_destination = { BuildStep::Copy { source: ".".into(), destination: "".into() }, "destination" },
    )]
    fn test_validate_rejects(step: BuildStep, expected: &str) {
        let plan = BuildPlan::new(vec![BuildStep::Workdir("/ok".into()), step]);
        let err = plan.validate().unwrap_err();
        match &err {
            PlanError::Invalid { index, message, .. } => {
                assert_eq!(*index, 1);
                assert!(message.contains(expected), "message: {}", message);
            }
            other => panic!("Expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_accepts_canonical_plan() {
        assert!(presets::bean_machine().validate().is_ok());
    }

    #[parameterized(
        json = { "plan.json", PlanFormat::Json },
        yaml = { "plan.yaml", PlanFormat::Yaml },
        yml = { "ci/plan.yml", PlanFormat::Yaml },
        dockerfile = { "Dockerfile", PlanFormat::Dockerfile },
        containerfile = { "Containerfile", PlanFormat::Dockerfile },
        suffixed = { "app.Dockerfile", PlanFormat::Dockerfile },
    )]
    fn test_format_detection(name: &str, expected: PlanFormat) {
        assert_eq!(PlanFormat::detect(&PathBuf::from(name)), expected);
    }

    #[test]
    fn test_yaml_plan_document() {
        let plan = BuildPlan::from_yaml(
            r#"
base: ruby:3.3
steps:
  - workdir: /src/bcknd/app
  - copy: { source: ".", destination: "." }
  - entrypoint: [python, ./bean_machine.py]
"#,
        )
        .unwrap();
        assert_eq!(plan.base(), Some("ruby:3.3"));
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_json_round_trip_of_preset() {
        let plan = presets::bean_machine();
        let json = serde_json::to_string(&plan).unwrap();
        assert_eq!(BuildPlan::from_json(&json).unwrap(), plan);
    }

    #[test]
    fn test_to_dockerfile_reparses() {
        let plan = presets::bean_machine();
        let recipe = plan.to_dockerfile();
        assert!(recipe.starts_with("WORKDIR /src/bcknd/app\n"));
        let reparsed = BuildPlan::from_dockerfile(&recipe, "/bin/sh").unwrap();
        assert_eq!(reparsed, plan);
    }

    #[test]
    fn test_load_missing_file() {
        let err = BuildPlan::load(Path::new("/nonexistent/plan.yaml"), "/bin/sh").unwrap_err();
        assert!(matches!(err, PlanError::Io { .. }));
    }

    #[test]
    fn test_display_lists_steps() {
        let text = presets::bean_machine().to_string();
        assert!(text.contains("Steps: 5"));
        assert!(text.contains("[3] run_command"));
    }
}
