//! Workspace layout rooted at an explicit directory.
//!
//! Every path the harness touches is derived from [`WorkspaceLayout::root`];
//! nothing here consults the process working directory.

use crate::Version;
use std::path::{Path, PathBuf};

/// Directory holding generated imageset configuration files.
const CONFIG_DIR: &str = "oc-mirror-clone";
const MIRROR_DIR: &str = "mirror";
const PLATFORM_DIR: &str = "platform";
const RESULTS_DIR: &str = "results";

/// Resolved paths for one harness workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    /// Create a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding generated imageset configs.
    pub fn config_dir(&self) -> PathBuf {
        self.root.join(CONFIG_DIR)
    }

    /// Download destination for one version.
    pub fn mirror_dir(&self, version: Version) -> PathBuf {
        self.root
            .join(MIRROR_DIR)
            .join(format!("operators-{}", version.as_str()))
    }

    /// Cache directory for one version. Never wiped by a clean run.
    pub fn cache_dir(&self, version: Version) -> PathBuf {
        self.root.join(format!("operators-{}", version.as_str()))
    }

    /// Platform directory holding upload configs.
    pub fn platform_dir(&self) -> PathBuf {
        self.root.join(PLATFORM_DIR)
    }

    /// Upload source tree (copy of the version's mirror output).
    pub fn platform_mirror(&self) -> PathBuf {
        self.platform_dir().join("mirror")
    }

    /// Where result files are written.
    pub fn results_dir(&self) -> PathBuf {
        self.root.join(RESULTS_DIR)
    }

    /// Download-phase imageset config for one version.
    pub fn imageset_config(&self, version: Version) -> PathBuf {
        self.config_dir()
            .join(format!("imagesetconfiguration_operators-{}.yaml", version.as_str()))
    }

    /// Upload-phase imageset config for one version.
    pub fn platform_config(&self, version: Version) -> PathBuf {
        self.platform_dir()
            .join(format!("platform_config-{}.yaml", version.as_str()))
    }

    /// Every directory setup must create, parents first.
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.config_dir()];
        for version in Version::ALL {
            dirs.push(self.mirror_dir(version));
        }
        dirs.push(self.platform_dir());
        dirs.push(self.platform_mirror());
        for version in Version::ALL {
            dirs.push(self.cache_dir(version));
        }
        dirs.push(self.results_dir());
        dirs
    }

    /// Directories reset by a clean run of `version`.
    pub fn clean_run_dirs(&self, version: Version) -> Vec<PathBuf> {
        vec![self.mirror_dir(version), self.platform_mirror()]
    }
}

impl Default for WorkspaceLayout {
    fn default() -> Self {
        Self::new(".")
    }
}
