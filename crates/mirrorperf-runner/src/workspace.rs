//! Filesystem preparation around iterations.

use crate::error::{Result, RunnerError};
use mirrorperf_config::imageset::write_imageset_config;
use mirrorperf_config::{PackageSpec, Version, WorkspaceLayout};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Owns the directories of one workspace for the duration of a run.
#[derive(Debug, Clone)]
pub struct Workspace {
    layout: WorkspaceLayout,
}

fn reset_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(RunnerError::setup(path, err)),
    }
    fs::create_dir_all(path).map_err(|err| RunnerError::setup(path, err))
}

impl Workspace {
    /// Workspace over `layout`.
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self { layout }
    }

    /// Paths of this workspace.
    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    /// Create every directory and write both versions' imageset and
    /// platform configs. Any failure is fatal.
    pub fn setup(&self, catalog: &str, packages: &[PackageSpec]) -> Result<()> {
        for dir in self.layout.required_dirs() {
            fs::create_dir_all(&dir).map_err(|err| RunnerError::setup(&dir, err))?;
        }
        for version in Version::ALL {
            for path in [
                self.layout.imageset_config(version),
                self.layout.platform_config(version),
            ] {
                write_imageset_config(&path, version.api_version(), catalog, packages)?;
            }
        }
        info!(root = %self.layout.root().display(), "workspace ready");
        Ok(())
    }

    /// Empty the mirror output of `version` and the upload staging tree.
    /// Cache directories survive.
    pub fn clean_for_version(&self, version: Version) -> Result<()> {
        for dir in self.layout.clean_run_dirs(version) {
            reset_dir(&dir)?;
        }
        debug!(%version, "workspace cleaned for clean run");
        Ok(())
    }

    /// Reset the staging tree plus the next group's mirror and cache.
    ///
    /// The previous group's mirror output stays so both trees can be compared.
    pub fn clean_between_groups(&self, next: Version) -> Result<()> {
        for dir in [
            self.layout.platform_mirror(),
            self.layout.mirror_dir(next),
            self.layout.cache_dir(next),
        ] {
            reset_dir(&dir)?;
        }
        info!(next = %next, "workspace cleaned between version groups");
        Ok(())
    }

    /// Copy the mirror output of `version` into the upload staging tree,
    /// overwriting files already there. Returns the number of files copied.
    pub fn stage_upload(&self, version: Version) -> Result<u64> {
        let source = self.layout.mirror_dir(version);
        let target = self.layout.platform_mirror();
        let copied = copy_tree(&source, &target)?;
        debug!(%version, files = copied, "staged mirror output for upload");
        Ok(copied)
    }
}

fn copy_tree(source: &Path, target: &Path) -> Result<u64> {
    fs::create_dir_all(target).map_err(|err| RunnerError::setup(target, err))?;
    let mut copied = 0;

    for entry in WalkDir::new(source).min_depth(1).follow_links(true) {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(source).to_path_buf();
            RunnerError::setup(path, err.into())
        })?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination).map_err(|err| RunnerError::setup(&destination, err))?;
        } else {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|err| RunnerError::setup(parent, err))?;
            }
            fs::copy(entry.path(), &destination)
                .map_err(|err| RunnerError::setup(&destination, err))?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorperf_config::imageset::default_packages;
    use mirrorperf_config::imageset::DEFAULT_CATALOG;
    use tempfile::TempDir;

    fn workspace(root: &Path) -> Workspace {
        let ws = Workspace::new(WorkspaceLayout::new(root));
        ws.setup(DEFAULT_CATALOG, &default_packages()).unwrap();
        ws
    }

    #[test]
    fn setup_creates_dirs_and_configs() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path());
        for dir in ws.layout().required_dirs() {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
        let v1 = fs::read_to_string(ws.layout().imageset_config(Version::V1)).unwrap();
        assert!(v1.contains("mirror.openshift.io/v1alpha2"));
        let v2 = fs::read_to_string(ws.layout().platform_config(Version::V2)).unwrap();
        assert!(v2.contains("mirror.openshift.io/v2alpha1"));
    }

    #[test]
    fn clean_run_keeps_cache() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path());
        let layout = ws.layout();
        fs::write(layout.mirror_dir(Version::V2).join("old.tar"), b"x").unwrap();
        fs::write(layout.cache_dir(Version::V2).join("cached"), b"x").unwrap();

        ws.clean_for_version(Version::V2).unwrap();
        assert!(layout.mirror_dir(Version::V2).is_dir());
        assert!(!layout.mirror_dir(Version::V2).join("old.tar").exists());
        assert!(layout.cache_dir(Version::V2).join("cached").exists());
    }

    #[test]
    fn between_groups_keeps_previous_output() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path());
        let layout = ws.layout();
        fs::write(layout.mirror_dir(Version::V1).join("v1.tar"), b"x").unwrap();
        fs::write(layout.cache_dir(Version::V2).join("stale"), b"x").unwrap();
        fs::write(layout.platform_mirror().join("staged"), b"x").unwrap();

        ws.clean_between_groups(Version::V2).unwrap();
        assert!(layout.mirror_dir(Version::V1).join("v1.tar").exists());
        assert!(!layout.cache_dir(Version::V2).join("stale").exists());
        assert!(!layout.platform_mirror().join("staged").exists());
    }

    #[test]
    fn stage_upload_copies_nested_tree() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path());
        let mirror = ws.layout().mirror_dir(Version::V1);
        fs::create_dir_all(mirror.join("blobs/sha256")).unwrap();
        fs::write(mirror.join("blobs/sha256/abc"), b"layer").unwrap();
        fs::write(mirror.join("mirror_seq1_000000.tar"), b"archive").unwrap();

        assert_eq!(ws.stage_upload(Version::V1).unwrap(), 2);
        let staged = ws.layout().platform_mirror();
        assert_eq!(fs::read(staged.join("blobs/sha256/abc")).unwrap(), b"layer");
        assert!(staged.join("mirror_seq1_000000.tar").is_file());
    }
}
