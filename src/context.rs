//! Build context: the read-only directory tree handed to a build

use crate::error::BuildError;
use anyhow::{Context, Result};
use ignore::{overrides::OverrideBuilder, WalkBuilder};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

pub const IGNORE_FILE: &str = ".dockerignore";

/// A file or directory inside the context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub relative: PathBuf,
    pub is_dir: bool,
}

/// An entry chosen by a copy source, with its path relative to the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedEntry {
    pub host_path: PathBuf,
    pub target: PathBuf,
    pub is_dir: bool,
}

/// Entries matched by one copy source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub entries: Vec<SelectedEntry>,
    /// The source named exactly one file
    pub single_file: bool,
}

#[derive(Debug, Clone)]
pub struct BuildContext {
    root: PathBuf,
    entries: Vec<ContextEntry>,
}

impl BuildContext {
    /// Scan `root`, honoring a `.dockerignore` file
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            anyhow::bail!("Build context {:?} is not a directory", root);
        }

        let walker = WalkBuilder::new(&root)
            .hidden(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .parents(false)
            .follow_links(false)
            .add_custom_ignore_filename(IGNORE_FILE)
            .build();

        let mut entries = Vec::new();
        for entry in walker {
            let entry = entry.context("Failed to read build context entry")?;
            let path = entry.path();
            if path == root {
                continue;
            }

            let relative = path
                .strip_prefix(&root)
                .context("Failed to strip prefix")?
                .to_path_buf();

            let metadata = match std::fs::metadata(path) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(path = %relative.display(), error = %e, "Skipping unreadable context entry");
                    continue;
                }
            };

            let is_symlink = entry.path_is_symlink();
            if is_symlink && metadata.is_dir() {
                warn!(path = %relative.display(), "Skipping symlinked directory in build context");
                continue;
            }

            entries.push(ContextEntry {
                relative,
                is_dir: metadata.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.relative.cmp(&b.relative));
        debug!(root = %root.display(), entries = entries.len(), "Loaded build context");

        Ok(Self { root, entries })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a copy source against the context
    pub fn select(&self, source: &str) -> Result<Selection, BuildError> {
        let not_found = || BuildError::SourceNotFound {
            source_pattern: source.to_string(),
        };

        if self.entries.is_empty() {
            return Err(not_found());
        }

        let normalized = normalize_source(source).ok_or_else(not_found)?;

        let selection = if normalized.as_os_str().is_empty() {
            self.select_under(Path::new(""))
        } else if let Some(entry) = self.entries.iter().find(|e| e.relative == normalized) {
            if entry.is_dir {
                self.select_under(&normalized)
            } else {
                let name = normalized.file_name().map(PathBuf::from).ok_or_else(not_found)?;
                Selection {
                    entries: vec![SelectedEntry {
                        host_path: self.root.join(&normalized),
                        target: name,
                        is_dir: false,
                    }],
                    single_file: true,
                }
            }
        } else {
            self.select_glob(source)?
        };

        if selection.entries.is_empty() {
            return Err(not_found());
        }
        Ok(selection)
    }

    fn select_under(&self, dir: &Path) -> Selection {
        let entries = self
            .entries
            .iter()
            .filter_map(|e| {
                let target = e.relative.strip_prefix(dir).ok()?;
                if target.as_os_str().is_empty() {
                    return None;
                }
                Some(SelectedEntry {
                    host_path: self.root.join(&e.relative),
                    target: target.to_path_buf(),
                    is_dir: e.is_dir,
                })
            })
            .collect();

        Selection {
            entries,
            single_file: false,
        }
    }

    fn select_glob(&self, pattern: &str) -> Result<Selection, BuildError> {
        // Anchored at the context root: `*.rb` does not reach into subdirectories
        let anchored = format!(
            "/{}",
            pattern.trim_start_matches("./").trim_start_matches('/')
        );
        let mut builder = OverrideBuilder::new(&self.root);
        builder
            .add(&anchored)
            .map_err(|e| BuildError::InvalidPath {
                path: pattern.to_string(),
                reason: e.to_string(),
            })?;
        let overrides = builder.build().map_err(|e| BuildError::InvalidPath {
            path: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let entries = self
            .entries
            .iter()
            .filter(|e| !e.is_dir)
            .filter(|e| {
                overrides
                    .matched(self.root.join(&e.relative), false)
                    .is_whitelist()
            })
            .map(|e| SelectedEntry {
                host_path: self.root.join(&e.relative),
                target: e.relative.clone(),
                is_dir: false,
            })
            .collect();

        Ok(Selection {
            entries,
            single_file: false,
        })
    }
}

/// Strip `./` and leading `/`; `None` when the source climbs out of the context
fn normalize_source(source: &str) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in Path::new(source.trim()).components() {
        match component {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::Normal(name) => normalized.push(name),
        }
    }
    Some(normalized)
}
