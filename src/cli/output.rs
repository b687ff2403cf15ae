//! Output formatting for multiple formats
//!
//! Plans render as JSON, YAML, a human summary or a Dockerfile-style recipe.
//! Manifests render as JSON, YAML, a human summary or an OCI image config.
//!
//! # Example
//!
//! ```
//! use imageplan::cli::output::{OutputFormat, OutputFormatter};
//! use imageplan::plan::presets;
//!
//! let formatter = OutputFormatter::new(OutputFormat::Dockerfile);
//! let output = formatter.format_plan(&presets::bean_machine()).unwrap();
//! assert!(output.starts_with("WORKDIR /src/bcknd/app"));
//! ```

use anyhow::{bail, Context, Result};

use crate::image::ImageManifest;
use crate::plan::BuildPlan;

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format (human-friendly, version-control friendly)
    Yaml,
    /// Human-readable formatted text
    Human,
    /// Dockerfile-style recipe (plans only)
    Dockerfile,
    /// OCI image configuration JSON (manifests only)
    Oci,
}

/// Output formatter for plans and manifests
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Creates a new output formatter with the specified format
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats a build plan according to the configured format
    pub fn format_plan(&self, plan: &BuildPlan) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(plan).context("Failed to serialize plan to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(plan).context("Failed to serialize plan to YAML")
            }
            OutputFormat::Human => Ok(plan.to_string()),
            OutputFormat::Dockerfile => Ok(plan.to_dockerfile()),
            OutputFormat::Oci => bail!("OCI output is only available for build manifests"),
        }
    }

    /// Formats an image manifest according to the configured format
    pub fn format_manifest(&self, manifest: &ImageManifest) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(manifest)
                .context("Failed to serialize manifest to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(manifest).context("Failed to serialize manifest to YAML")
            }
            OutputFormat::Human => Ok(manifest.to_string()),
            OutputFormat::Oci => serde_json::to_string_pretty(&manifest.to_oci_config())
                .context("Failed to serialize OCI image config"),
            OutputFormat::Dockerfile => {
                bail!("Dockerfile output is only available for build plans")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{HistoryEntry, ImageState};
    use crate::pipeline::PipelineStatus;
    use crate::plan::{presets, StepKind};
    use std::path::PathBuf;

    fn create_test_manifest() -> ImageManifest {
        let mut state = ImageState::new();
        state.workdir = PathBuf::from("/src/bcknd/app");
        state
            .env
            .insert("BUNDLE_FROZEN".to_string(), "true".to_string());
        state.entrypoint = Some(vec!["python".into(), "./bean_machine.py".into()]);
        state.history.push(HistoryEntry {
            step: 0,
            kind: StepKind::SetWorkdir,
            created_by: "WORKDIR /src/bcknd/app".into(),
        });
        ImageManifest::from_state(
            "build-1",
            &state,
            PipelineStatus::Succeeded,
            PathBuf::from("/tmp/rootfs"),
            vec![],
        )
    }

    #[test]
    fn test_plan_json_format() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_plan(&presets::bean_machine()).unwrap();

        assert!(output.contains("/src/bcknd/app"));
        let parsed = BuildPlan::from_json(&output).unwrap();
        assert_eq!(parsed, presets::bean_machine());
    }

    #[test]
    fn test_plan_yaml_format() {
        let formatter = OutputFormatter::new(OutputFormat::Yaml);
        let output = formatter.format_plan(&presets::bean_machine()).unwrap();

        let parsed = BuildPlan::from_yaml(&output).unwrap();
        assert_eq!(parsed, presets::bean_machine());
    }

    #[test]
    fn test_plan_human_format() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter.format_plan(&presets::bean_machine()).unwrap();

        assert!(output.contains("Steps: 5"));
        assert!(output.contains("set_entrypoint"));
    }

    #[test]
    fn test_plan_rejects_oci() {
        let formatter = OutputFormatter::new(OutputFormat::Oci);
        assert!(formatter.format_plan(&presets::bean_machine()).is_err());
    }

    #[test]
    fn test_manifest_json_format() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_manifest(&create_test_manifest()).unwrap();

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["workdir"], "/src/bcknd/app");
        assert_eq!(value["env"]["BUNDLE_FROZEN"], "true");
        assert_eq!(value["status"], "succeeded");
    }

    #[test]
    fn test_manifest_yaml_format() {
        let formatter = OutputFormatter::new(OutputFormat::Yaml);
        let output = formatter.format_manifest(&create_test_manifest()).unwrap();

        assert!(output.contains("workdir: /src/bcknd/app"));
        let value: serde_yaml::Value = serde_yaml::from_str(&output).unwrap();
        assert_eq!(value["build_id"].as_str(), Some("build-1"));
    }

    #[test]
    fn test_manifest_oci_format() {
        let formatter = OutputFormatter::new(OutputFormat::Oci);
        let output = formatter.format_manifest(&create_test_manifest()).unwrap();

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["config"]["Entrypoint"][0], "python");
        assert_eq!(value["history"][0]["created_by"], "WORKDIR /src/bcknd/app");
    }

    #[test]
    fn test_manifest_rejects_dockerfile() {
        let formatter = OutputFormatter::new(OutputFormat::Dockerfile);
        assert!(formatter.format_manifest(&create_test_manifest()).is_err());
    }
}
