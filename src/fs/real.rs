use super::{DirEntry, FileMetadata, FileSystem, FileType};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Image layer backed by a host directory acting as `/`
pub struct RealFileSystem {
    root: PathBuf,
}

impl RealFileSystem {
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.root.join(relative)
    }

    /// Symlinks are reported as such and never followed
    fn classify(ft: fs::FileType) -> FileType {
        if ft.is_file() {
            FileType::File
        } else if ft.is_dir() {
            FileType::Directory
        } else {
            FileType::Symlink
        }
    }
}

impl FileSystem for RealFileSystem {
    fn file_type(&self, path: &Path) -> Option<FileType> {
        fs::symlink_metadata(self.resolve(path))
            .ok()
            .map(|meta| Self::classify(meta.file_type()))
    }

    fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let host = self.resolve(path);
        let meta = fs::symlink_metadata(&host)
            .context(format!("Failed to get metadata for {:?}", host))?;

        Ok(FileMetadata {
            size: meta.len(),
            file_type: Self::classify(meta.file_type()),
        })
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        let host = self.resolve(path);
        if self.file_type(path) == Some(FileType::Directory) {
            return Ok(());
        }
        fs::create_dir(&host).context(format!("Failed to create directory {:?}", host))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let host = self.resolve(path);
        fs::write(&host, contents).context(format!("Failed to write file {:?}", host))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let host = self.resolve(path);
        fs::read(&host).context(format!("Failed to read file {:?}", host))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let host = self.resolve(path);
        let entries = fs::read_dir(&host).context(format!("Failed to read directory {:?}", host))?;

        let mut result = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read directory entry")?;
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry
                .file_type()
                .map(Self::classify)
                .context(format!("Failed to read file type of {:?}", entry.path()))?;

            result.push(DirEntry {
                path: path.join(&name),
                name,
                file_type,
            });
        }

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    fn host_path(&self, path: &Path) -> PathBuf {
        self.resolve(path)
    }
}
