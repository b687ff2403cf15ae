//! The image under construction and the artifacts a build produces

pub mod layer;
pub mod manifest;
pub mod path;
pub mod state;

pub use layer::{export_layer, LayerDescriptor};
pub use manifest::{sha256_digest, snapshot, ImageManifest, SnapshotEntry};
pub use state::{HistoryEntry, ImageState};
