//! Lexical path handling inside the image

use crate::error::BuildError;
use std::path::{Component, Path, PathBuf};

/// Join `path` onto `base` and normalize the result lexically
///
/// Absolute inputs replace the base. `..` never climbs above `/`, so the
/// result always stays inside the image.
pub fn resolve(base: &Path, path: &str) -> PathBuf {
    let mut parts: Vec<String> = Vec::new();

    if !path.starts_with('/') {
        push_components(&mut parts, base);
    }
    push_components(&mut parts, Path::new(path));

    let mut resolved = PathBuf::from("/");
    for part in parts {
        resolved.push(part);
    }
    resolved
}

fn push_components(parts: &mut Vec<String>, path: &Path) {
    for component in path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => parts.clear(),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(name) => parts.push(name.to_string_lossy().to_string()),
        }
    }
}

/// Validate and normalize an absolute image path such as a workdir
pub fn absolute(path: &str) -> Result<PathBuf, BuildError> {
    if path.is_empty() {
        return Err(BuildError::InvalidPath {
            path: path.to_string(),
            reason: "path cannot be empty".to_string(),
        });
    }
    if !path.starts_with('/') {
        return Err(BuildError::InvalidPath {
            path: path.to_string(),
            reason: "path must be absolute".to_string(),
        });
    }
    if path.contains('\0') {
        return Err(BuildError::InvalidPath {
            path: path.to_string(),
            reason: "path contains a NUL byte".to_string(),
        });
    }
    Ok(resolve(Path::new("/"), path))
}

/// Every prefix of an absolute path below `/`, shortest first
///
/// `/src/app` yields `/src`, `/src/app`.
pub fn ancestors_inclusive(path: &Path) -> Vec<PathBuf> {
    let mut prefixes: Vec<PathBuf> = path
        .ancestors()
        .filter(|p| *p != Path::new("/") && !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .collect();
    prefixes.reverse();
    prefixes
}
