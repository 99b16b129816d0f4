//! Recursive directory size.

use std::path::Path;
use walkdir::WalkDir;

/// Total bytes and file count under a directory tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirStats {
    /// Sum of regular file sizes
    pub bytes: u64,
    /// Number of regular files
    pub files: u64,
}

/// Walk `path` and total its regular files.
///
/// Unreadable entries are skipped; a missing directory is empty.
pub fn dir_stats(path: &Path) -> DirStats {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .fold(DirStats::default(), |acc, meta| DirStats {
            bytes: acc.bytes + meta.len(),
            files: acc.files + 1,
        })
}
