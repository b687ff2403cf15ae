//! FileSystem trait definition

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Metadata about a file
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub file_type: FileType,
}

/// Type of file system entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

/// A directory entry returned by read_dir
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub path: PathBuf,
    pub name: String,
    pub file_type: FileType,
}

impl DirEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.name
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }
}

/// Abstraction over the image filesystem layer
///
/// All paths are absolute image paths (`/src/app/Gemfile`), already
/// normalized. Implementations decide where those paths live on the host.
pub trait FileSystem: Send + Sync {
    /// Type of the entry at `path`, `None` when nothing exists there
    fn file_type(&self, path: &Path) -> Option<FileType>;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool {
        self.file_type(path).is_some()
    }

    /// Check if path is a directory
    fn is_dir(&self, path: &Path) -> bool {
        self.file_type(path) == Some(FileType::Directory)
    }

    /// Check if path is a file
    fn is_file(&self, path: &Path) -> bool {
        self.file_type(path) == Some(FileType::File)
    }

    /// Get file/directory metadata
    fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a single directory; the parent must already exist
    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Create or truncate a file; the parent must already exist
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Read file contents
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// List directory contents
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Host location of an image path, used as the working directory of
    /// delegated commands
    fn host_path(&self, path: &Path) -> PathBuf;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_entry() {
        let entry = DirEntry {
            path: PathBuf::from("/src/Gemfile"),
            name: "Gemfile".to_string(),
            file_type: FileType::File,
        };
        assert_eq!(entry.path(), Path::new("/src/Gemfile"));
        assert_eq!(entry.file_name(), "Gemfile");
        assert_eq!(entry.file_type(), FileType::File);
    }
}
