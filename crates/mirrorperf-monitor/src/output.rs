//! Mirror output analysis and content comparison.
//!
//! [`analyze_output`] walks a directory once, hashing every file and
//! classifying it as layer, manifest or signature. The per-file hashes are
//! sorted before being folded into a single directory fingerprint, so two
//! trees with the same content fingerprint identically no matter in which
//! order the filesystem yields their entries.

use crate::error::{MonitorError, Result};
use crate::format::format_bytes_human;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Files at or above this size are identified by size and path instead of content.
pub const LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Number of entries kept in [`OutputMetrics::largest_files`].
pub const LARGEST_FILES_KEPT: usize = 10;

const HASH_BUFFER_SIZE: usize = 32 * 1024;

/// One file in an analyzed tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the analyzed root, `/`-separated
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Hex SHA-256, or a `size:` pseudo-hash for large files
    pub hash: String,
}

/// Size, composition and fingerprint of a mirror output directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputMetrics {
    /// Analyzed root
    pub directory: PathBuf,
    /// Sum of file sizes
    pub total_size: u64,
    /// Number of files
    pub total_files: u64,
    /// Number of directories, root included
    pub total_dirs: u64,
    /// Order-independent fingerprint of all file hashes
    pub directory_hash: String,
    /// Hash per relative path
    pub file_hashes: BTreeMap<String, String>,
    /// Largest files, biggest first
    pub largest_files: Vec<FileEntry>,
    /// File count per lowercase extension
    pub file_types: BTreeMap<String, u64>,
    /// Files under a `blobs/` directory
    pub layer_count: u64,
    /// Manifest-like files
    pub manifest_count: u64,
    /// Signature files
    pub signature_count: u64,
}

impl OutputMetrics {
    /// Mean file size, zero for an empty tree.
    pub fn average_file_size(&self) -> u64 {
        self.total_size.checked_div(self.total_files).unwrap_or(0)
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        format!(
            "Size: {} | Files: {} | Dirs: {} | Layers: {} | Manifests: {}",
            format_bytes_human(self.total_size),
            self.total_files,
            self.total_dirs,
            self.layer_count,
            self.manifest_count
        )
    }
}

/// Differences between two analyzed trees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputComparison {
    /// Fingerprints equal and no per-file differences
    pub matches: bool,
    /// Fingerprints equal
    pub hash_match: bool,
    /// first.total_size - second.total_size
    pub size_difference: i64,
    /// first.total_files - second.total_files
    pub file_count_diff: i64,
    /// Present only in the second tree
    pub missing_in_first: Vec<String>,
    /// Present only in the first tree
    pub missing_in_second: Vec<String>,
    /// Present in both with different hashes
    pub different_content: Vec<String>,
}

/// Fold per-file hashes into one fingerprint.
///
/// Sorts first, so the result does not depend on input order.
pub fn combine_hashes<I, S>(hashes: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sorted: Vec<String> = hashes
        .into_iter()
        .map(|hash| hash.as_ref().to_owned())
        .collect();
    sorted.sort();
    let mut hasher = Sha256::new();
    for hash in &sorted {
        hasher.update(hash.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walk `dir` and compute its [`OutputMetrics`].
///
/// Fails only when the root itself cannot be read; unreadable entries below
/// it are skipped.
pub fn analyze_output(dir: &Path) -> Result<OutputMetrics> {
    let mut metrics = OutputMetrics {
        directory: dir.to_path_buf(),
        ..Default::default()
    };
    let mut files = Vec::new();

    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(MonitorError::Walk(err)),
            Err(err) => {
                trace!(error = %err, "skipping unreadable entry");
                continue;
            }
        };

        if entry.file_type().is_dir() {
            metrics.total_dirs += 1;
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }

        let size = meta.len();
        let rel = relative_path(dir, entry.path());
        let lower = rel.to_lowercase();

        metrics.total_files += 1;
        metrics.total_size += size;

        let ext = entry
            .path()
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_else(|| "(no extension)".to_string());
        *metrics.file_types.entry(ext).or_insert(0) += 1;

        if lower.starts_with("blobs/") || lower.contains("/blobs/") {
            metrics.layer_count += 1;
        }
        if lower.contains("manifest") || lower.ends_with(".json") {
            metrics.manifest_count += 1;
        }
        if lower.contains("signature") || lower.ends_with(".sig") {
            metrics.signature_count += 1;
        }

        let hash = if size >= LARGE_FILE_THRESHOLD {
            format!("size:{}:{}", size, rel)
        } else {
            match hash_file(entry.path()) {
                Ok(hash) => hash,
                Err(err) => {
                    trace!(path = %rel, error = %err, "skipping unhashable file");
                    continue;
                }
            }
        };

        metrics.file_hashes.insert(rel.clone(), hash.clone());
        files.push(FileEntry {
            path: rel,
            size,
            hash,
        });
    }

    files.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
    files.truncate(LARGEST_FILES_KEPT);
    metrics.largest_files = files;
    metrics.directory_hash = combine_hashes(metrics.file_hashes.values());

    debug!(
        dir = %dir.display(),
        files = metrics.total_files,
        bytes = metrics.total_size,
        "output analyzed"
    );
    Ok(metrics)
}

/// Compare two already-analyzed trees.
pub fn diff_outputs(first: &OutputMetrics, second: &OutputMetrics) -> OutputComparison {
    let mut comparison = OutputComparison {
        hash_match: first.directory_hash == second.directory_hash,
        size_difference: first.total_size as i64 - second.total_size as i64,
        file_count_diff: first.total_files as i64 - second.total_files as i64,
        ..Default::default()
    };

    for (path, hash) in &first.file_hashes {
        match second.file_hashes.get(path) {
            Some(other) if other != hash => comparison.different_content.push(path.clone()),
            Some(_) => {}
            None => comparison.missing_in_second.push(path.clone()),
        }
    }
    comparison.missing_in_first = second
        .file_hashes
        .keys()
        .filter(|path| !first.file_hashes.contains_key(*path))
        .cloned()
        .collect();

    comparison.matches = comparison.hash_match
        && comparison.missing_in_first.is_empty()
        && comparison.missing_in_second.is_empty()
        && comparison.different_content.is_empty();
    comparison
}

/// Analyze both trees concurrently and compare them.
pub async fn compare_outputs(first: &Path, second: &Path) -> Result<OutputComparison> {
    let (a, b) = (first.to_path_buf(), second.to_path_buf());
    let (first_metrics, second_metrics) = tokio::join!(
        tokio::task::spawn_blocking(move || analyze_output(&a)),
        tokio::task::spawn_blocking(move || analyze_output(&b)),
    );
    Ok(diff_outputs(&first_metrics??, &second_metrics??))
}
