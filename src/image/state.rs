//! The image under construction, threaded through every step

use crate::plan::StepKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One executed step, as recorded in the image history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step: usize,
    pub kind: StepKind,
    pub created_by: String,
}

/// Working directory, environment and launch directive established so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageState {
    pub workdir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub entrypoint: Option<Vec<String>>,
    pub history: Vec<HistoryEntry>,
}

impl Default for ImageState {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("/"),
            env: BTreeMap::new(),
            entrypoint: None,
            history: Vec::new(),
        }
    }
}

impl ImageState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment rendered as `KEY=VALUE` strings, sorted by key
    pub fn env_list(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}
