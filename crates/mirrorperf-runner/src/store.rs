//! Result files: one pretty JSON document per run.

use crate::error::{Result, RunnerError};
use crate::result::TestResult;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const FILE_PREFIX: &str = "results_";
const FILE_EXTENSION: &str = "json";

/// Reads and writes result files under one directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    /// Store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the result files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `results` to `results_YYYYMMDD_HHMMSS.json` and return its path.
    pub fn save(&self, results: &[TestResult]) -> Result<PathBuf> {
        let name = format!(
            "{}{}.{}",
            FILE_PREFIX,
            Local::now().format("%Y%m%d_%H%M%S"),
            FILE_EXTENSION
        );
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(results)?;

        fs::create_dir_all(&self.dir).map_err(|source| RunnerError::Persist {
            path: self.dir.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| RunnerError::Persist {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), results = results.len(), "results saved");
        Ok(path)
    }

    /// Read one result file.
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<TestResult>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| RunnerError::Persist {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Result files in this store, oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(RunnerError::Persist {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                let named = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(FILE_PREFIX));
                named && path.extension().is_some_and(|e| e == FILE_EXTENSION)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorperf_config::Version;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("results"));
        let mut result = TestResult::new(1, Version::V1);
        result.download_phase.wall_time = Duration::from_millis(1500);
        result.generate_summary();

        let path = store.save(&[result.clone()]).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("results_"));
        assert_eq!(name.len(), "results_20261018_120000.json".len());

        let loaded = ResultStore::load(&path).unwrap();
        assert_eq!(loaded, vec![result]);
        assert_eq!(store.list().unwrap(), vec![path]);
    }

    #[test]
    fn list_ignores_other_files_and_missing_dir() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        fs::write(dir.path().join("results_20240101_000000.json"), "[]").unwrap();
        fs::write(dir.path().join("results_20230101_000000.json"), "[]").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].ends_with("results_20230101_000000.json"));
        assert!(ResultStore::new(dir.path().join("absent")).list().unwrap().is_empty());
    }

    #[test]
    fn unwritable_dir_is_a_persist_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        let err = ResultStore::new(blocker.join("results")).save(&[]).unwrap_err();
        assert!(matches!(err, RunnerError::Persist { .. }));
    }
}
