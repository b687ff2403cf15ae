//! Image manifest: the declarative result of a build

use super::layer::LayerDescriptor;
use super::state::{HistoryEntry, ImageState};
use crate::fs::{FileSystem, FileType};
use crate::pipeline::PipelineStatus;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A file captured in the filesystem snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub path: String,
    pub size: u64,
    pub digest: String,
}

/// Result of a build
///
/// Only a manifest whose status is `Succeeded` describes a usable image;
/// failed builds still produce one so callers can inspect how far they got.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageManifest {
    pub build_id: String,
    pub created: DateTime<Utc>,
    pub status: PipelineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    pub workdir: String,
    pub env: BTreeMap<String, String>,
    pub entrypoint: Option<Vec<String>>,
    pub rootfs: PathBuf,
    pub snapshot: Vec<SnapshotEntry>,
    pub history: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<LayerDescriptor>,
}

impl ImageManifest {
    pub fn from_state(
        build_id: impl Into<String>,
        state: &ImageState,
        status: PipelineStatus,
        rootfs: PathBuf,
        snapshot: Vec<SnapshotEntry>,
    ) -> Self {
        Self {
            build_id: build_id.into(),
            created: Utc::now(),
            status,
            base: None,
            workdir: state.workdir.display().to_string(),
            env: state.env.clone(),
            entrypoint: state.entrypoint.clone(),
            rootfs,
            snapshot,
            history: state.history.clone(),
            layer: None,
        }
    }

    pub fn with_base(mut self, base: Option<String>) -> Self {
        self.base = base;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.status == PipelineStatus::Succeeded
    }

    /// Render as an OCI image configuration document
    pub fn to_oci_config(&self) -> serde_json::Value {
        let env: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let history: Vec<serde_json::Value> = self
            .history
            .iter()
            .map(|h| {
                serde_json::json!({
                    "created": self.created.to_rfc3339(),
                    "created_by": h.created_by,
                    "empty_layer": !matches!(
                        h.kind,
                        crate::plan::StepKind::CopyFiles | crate::plan::StepKind::RunCommand
                    ),
                })
            })
            .collect();
        let diff_ids: Vec<&str> = self
            .layer
            .iter()
            .map(|layer| layer.diff_id.as_str())
            .collect();

        let mut config = serde_json::json!({
            "WorkingDir": self.workdir,
            "Env": env,
        });
        if let Some(entrypoint) = &self.entrypoint {
            config["Entrypoint"] = serde_json::json!(entrypoint);
        }

        serde_json::json!({
            "created": self.created.to_rfc3339(),
            "architecture": std::env::consts::ARCH,
            "os": "linux",
            "config": config,
            "rootfs": {
                "type": "layers",
                "diff_ids": diff_ids,
            },
            "history": history,
        })
    }
}

/// Capture every file below `/` with its size and content digest, sorted by path
pub fn snapshot(fs: &dyn FileSystem) -> Result<Vec<SnapshotEntry>> {
    let mut entries = Vec::new();
    collect(fs, Path::new("/"), &mut entries)?;
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn collect(fs: &dyn FileSystem, dir: &Path, entries: &mut Vec<SnapshotEntry>) -> Result<()> {
    for entry in fs.read_dir(dir)? {
        match entry.file_type() {
            FileType::Directory => collect(fs, entry.path(), entries)?,
            FileType::File => {
                let size = fs.metadata(entry.path())?.size;
                let contents = fs.read(entry.path())?;
                entries.push(SnapshotEntry {
                    path: entry.path().display().to_string(),
                    size,
                    digest: sha256_digest(&contents),
                });
            }
            FileType::Symlink => {}
        }
    }
    Ok(())
}

pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

impl fmt::Display for ImageManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Image Manifest")?;
        writeln!(f, "==============")?;
        writeln!(f, "Build:      {}", self.build_id)?;
        writeln!(f, "Status:     {}", self.status)?;
        if let Some(base) = &self.base {
            writeln!(f, "Base:       {}", base)?;
        }
        writeln!(f, "Workdir:    {}", self.workdir)?;
        match &self.entrypoint {
            Some(argv) => writeln!(f, "Entrypoint: {}", argv.join(" "))?,
            None => writeln!(f, "Entrypoint: (none)")?,
        }
        writeln!(f, "Rootfs:     {}", self.rootfs.display())?;
        writeln!(f)?;

        if !self.env.is_empty() {
            writeln!(f, "Environment:")?;
            for (key, value) in &self.env {
                writeln!(f, "  {}={}", key, value)?;
            }
            writeln!(f)?;
        }

        let total: u64 = self.snapshot.iter().map(|e| e.size).sum();
        writeln!(f, "Files: {} ({} bytes)", self.snapshot.len(), total)?;
        if let Some(layer) = &self.layer {
            writeln!(f, "Layer: {} ({} bytes)", layer.digest, layer.size)?;
        }
        writeln!(f)?;

        writeln!(f, "History:")?;
        for entry in &self.history {
            writeln!(f, "  [{}] {}", entry.step, entry.created_by)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;
    use crate::plan::StepKind;

    fn sample_state() -> ImageState {
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
        state.history.push(HistoryEntry {
            step: 1,
            kind: StepKind::CopyFiles,
            created_by: "COPY . .".into(),
        });
        state
    }

    #[test]
    fn test_snapshot_sorted_with_digests() {
        let fs = MockFileSystem::new();
        fs.add_file("/b/two.txt", "y");
        fs.add_file("/a/one.txt", "x");
        fs.add_dir("/empty");

        let entries = snapshot(&fs).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a/one.txt", "/b/two.txt"]);
        assert_eq!(entries[0].size, 1);
        assert_eq!(
            entries[0].digest,
            "sha256:2d711642b726b04401627ca9fbac32f5c8530fb1903cc4db02258717921a4881"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_snapshot_stays_inside_rootfs() {
        use crate::fs::RealFileSystem;
        use tempfile::TempDir;

        let rootfs = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        std::fs::write(host.path().join("host_secret.txt"), "secret").unwrap();
        std::fs::create_dir(rootfs.path().join("app")).unwrap();
        std::fs::write(rootfs.path().join("app/main.py"), "print(1)").unwrap();
        std::os::unix::fs::symlink(host.path(), rootfs.path().join("app/hostlink")).unwrap();
        std::os::unix::fs::symlink(".", rootfs.path().join("app/loop")).unwrap();

        let entries = snapshot(&RealFileSystem::rooted(rootfs.path())).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/app/main.py"]);
        assert_eq!(entries[0].size, 8);
    }

    #[test]
    fn test_validity_follows_status() {
        let state = sample_state();
        let ok = ImageManifest::from_state(
            "id",
            &state,
            PipelineStatus::Succeeded,
            PathBuf::from("/rootfs"),
            vec![],
        );
        assert!(ok.is_valid());

        let failed = ImageManifest::from_state(
            "id",
            &state,
            PipelineStatus::Failed,
            PathBuf::from("/rootfs"),
            vec![],
        );
        assert!(!failed.is_valid());
    }

    #[test]
    fn test_oci_config() {
        let manifest = ImageManifest::from_state(
            "id",
            &sample_state(),
            PipelineStatus::Succeeded,
            PathBuf::from("/rootfs"),
            vec![],
        );
        let oci = manifest.to_oci_config();

        assert_eq!(oci["os"], "linux");
        assert_eq!(oci["config"]["WorkingDir"], "/src/bcknd/app");
        assert_eq!(oci["config"]["Env"][0], "BUNDLE_FROZEN=true");
        assert_eq!(oci["config"]["Entrypoint"][1], "./bean_machine.py");
        assert_eq!(oci["history"][0]["empty_layer"], true);
        assert_eq!(oci["history"][1]["empty_layer"], false);
        assert_eq!(oci["rootfs"]["diff_ids"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_display() {
        let manifest = ImageManifest::from_state(
            "abc",
            &sample_state(),
            PipelineStatus::Succeeded,
            PathBuf::from("/rootfs"),
            vec![],
        );
        let text = manifest.to_string();
        assert!(text.contains("Workdir:    /src/bcknd/app"));
        assert!(text.contains("Entrypoint: python ./bean_machine.py"));
        assert!(text.contains("BUNDLE_FROZEN=true"));
    }

    #[test]
    fn test_serializes_without_entrypoint_as_null() {
        let manifest = ImageManifest::from_state(
            "abc",
            &ImageState::new(),
            PipelineStatus::Failed,
            PathBuf::from("/rootfs"),
            vec![],
        );
        let json = serde_json::to_value(&manifest).unwrap();
        assert!(json["entrypoint"].is_null());
        assert_eq!(json["status"], "failed");
        assert!(json.get("layer").is_none());
    }
}
