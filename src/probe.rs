//! Path attribute probe — directory, extension, and size lookups.
//!
//! Stateless helpers shared by every selection strategy. Lookups never
//! fail: a path that cannot be stat'ed is "not a directory", has size 0,
//! and the caller decides whether existence matters.

use std::path::{Path, PathBuf};

/// A file resolved from the file manager's selection.
///
/// `path` never refers to a directory; the resolver enforces this before
/// constructing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    /// Lower-cased suffix including the leading `.`, or empty.
    pub extension: String,
    pub size: u64,
}

impl SelectedFile {
    /// Probe a path on disk and build a `SelectedFile`.
    ///
    /// Returns `None` for directories and for paths that do not exist.
    pub fn probe(path: &Path) -> Option<Self> {
        if !path.exists() || is_directory(path) {
            return None;
        }
        Some(Self {
            path: path.to_path_buf(),
            extension: extension(path),
            size: size(path),
        })
    }
}

/// Whether `path` names an existing directory.
pub fn is_directory(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Normalized extension: `.` plus the lower-cased suffix, or empty.
///
/// Only the final path component is considered, so dots in parent
/// directory names never leak into the result. Dotfiles such as
/// `.gitignore` and names ending in a bare `.` have no extension.
pub fn extension(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{}", ext.to_lowercase()),
        _ => String::new(),
    }
}

/// Size of the file in bytes, 0 if metadata is unavailable.
pub fn size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
