use super::{DirEntry, FileMetadata, FileSystem, FileType};
use anyhow::{anyhow, bail, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
pub struct MockEntry {
    pub content: Option<Vec<u8>>,
    pub file_type: FileType,
}

/// In-memory image layer
pub struct MockFileSystem {
    files: RwLock<BTreeMap<PathBuf, MockEntry>>,
    host_root: PathBuf,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::with_host_root(PathBuf::from("/mock"))
    }

    pub fn with_host_root(host_root: PathBuf) -> Self {
        let mut files = BTreeMap::new();
        files.insert(
            PathBuf::from("/"),
            MockEntry {
                content: None,
                file_type: FileType::Directory,
            },
        );
        Self {
            files: RwLock::new(files),
            host_root,
        }
    }

    /// Seed a file, creating missing parents
    pub fn add_file(&self, path: impl AsRef<Path>, content: &str) {
        let path = Self::normalize_path(path.as_ref());
        let mut files = self.write_lock();

        if let Some(parent) = path.parent() {
            Self::ensure_parents(&mut files, parent);
        }

        files.insert(
            path,
            MockEntry {
                content: Some(content.as_bytes().to_vec()),
                file_type: FileType::File,
            },
        );
    }

    /// Seed a directory, creating missing parents
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = Self::normalize_path(path.as_ref());
        let mut files = self.write_lock();
        Self::ensure_parents(&mut files, &path);
    }

    /// All file paths currently stored, sorted
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.read_lock()
            .iter()
            .filter(|(_, e)| e.file_type == FileType::File)
            .map(|(p, _)| p.clone())
            .collect()
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, BTreeMap<PathBuf, MockEntry>> {
        self.files.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, BTreeMap<PathBuf, MockEntry>> {
        self.files.write().unwrap_or_else(|e| e.into_inner())
    }

    fn normalize_path(path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new("/").join(path)
        }
    }

    fn ensure_parents(files: &mut BTreeMap<PathBuf, MockEntry>, path: &Path) {
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            files.entry(current.clone()).or_insert(MockEntry {
                content: None,
                file_type: FileType::Directory,
            });
        }
    }

    fn require_parent_dir(files: &BTreeMap<PathBuf, MockEntry>, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("Path has no parent: {:?}", path))?;
        match files.get(parent) {
            Some(entry) if entry.file_type == FileType::Directory => Ok(()),
            Some(_) => bail!("Parent is not a directory: {:?}", parent),
            None => bail!("Parent directory not found: {:?}", parent),
        }
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MockFileSystem {
    fn file_type(&self, path: &Path) -> Option<FileType> {
        let path = Self::normalize_path(path);
        self.read_lock().get(&path).map(|e| e.file_type)
    }

    fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let path = Self::normalize_path(path);
        let files = self.read_lock();
        let entry = files
            .get(&path)
            .ok_or_else(|| anyhow!("Path not found: {:?}", path))?;

        Ok(FileMetadata {
            size: entry.content.as_ref().map(|c| c.len() as u64).unwrap_or(0),
            file_type: entry.file_type,
        })
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        let path = Self::normalize_path(path);
        let mut files = self.write_lock();
        Self::require_parent_dir(&files, &path)?;

        if let Some(existing) = files.get(&path) {
            if existing.file_type == FileType::Directory {
                return Ok(());
            }
            bail!("File exists: {:?}", path);
        }

        files.insert(
            path,
            MockEntry {
                content: None,
                file_type: FileType::Directory,
            },
        );
        Ok(())
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let path = Self::normalize_path(path);
        let mut files = self.write_lock();
        Self::require_parent_dir(&files, &path)?;

        if let Some(existing) = files.get(&path) {
            if existing.file_type == FileType::Directory {
                bail!("Is a directory: {:?}", path);
            }
        }

        files.insert(
            path,
            MockEntry {
                content: Some(contents.to_vec()),
                file_type: FileType::File,
            },
        );
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = Self::normalize_path(path);
        let files = self.read_lock();
        let entry = files
            .get(&path)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))?;

        entry
            .content
            .clone()
            .ok_or_else(|| anyhow!("Not a file: {:?}", path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let path = Self::normalize_path(path);
        let files = self.read_lock();

        match files.get(&path) {
            Some(entry) if entry.file_type == FileType::Directory => {}
            Some(_) => bail!("Not a directory: {:?}", path),
            None => bail!("Directory not found: {:?}", path),
        }

        let entries = files
            .iter()
            .filter(|(file_path, _)| {
                file_path.as_path() != path.as_path() && file_path.parent() == Some(path.as_path())
            })
            .map(|(file_path, entry)| DirEntry {
                path: file_path.clone(),
                name: file_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("")
                    .to_string(),
                file_type: entry.file_type,
            })
            .collect();

        Ok(entries)
    }

    fn host_path(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.host_root.join(relative)
    }
}
