//! Harness configuration: TOML file plus command-line overrides.
//!
//! Configuration lives in `~/.config/mirrorperf/config.toml` unless a path is
//! given explicitly or via `MIRRORPERF_CONFIG`.
//!
//! ```rust,no_run
//! use mirrorperf_config::HarnessConfig;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = HarnessConfig::load_or_default("mirrorperf.toml")?;
//! config.registry_url = "registry.local:5000/ocp".to_string();
//! config.validate()?;
//! assert_eq!(config.normalized_registry_url(), "docker://registry.local:5000/ocp");
//! # Ok(())
//! # }
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::imageset::{default_packages, PackageSpec, DEFAULT_CATALOG};
use crate::layout::WorkspaceLayout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "MIRRORPERF_CONFIG";

/// Registry port assumed when the URL carries none.
pub const DEFAULT_REGISTRY_PORT: u16 = 5000;

/// Everything the orchestrator needs to know before it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Destination registry (e.g. `docker://infra.lab:8443/ocp`)
    pub registry_url: String,
    /// Iterations per version group (first is clean, rest cached)
    pub iterations: u32,
    /// Run a v1 group followed by a v2 group
    pub compare_versions: bool,
    /// Skip TLS verification for the destination registry
    pub skip_tls: bool,
    /// Root directory for all mirror, cache and result directories
    pub workspace_root: PathBuf,
    /// oc-mirror executable name or path
    pub mirror_binary: String,
    /// Sampling cadence for every monitor
    pub poll_interval_ms: u64,
    /// Wait after stopping a monitor for a straggler sample
    pub stop_grace_ms: u64,
    /// Query `oc-mirror describe` after each iteration
    pub describe: bool,
    /// Watch cache directory writes during the download phase
    pub disk_monitoring: bool,
    /// Operator catalog to mirror
    pub catalog: String,
    /// Operator packages to mirror
    pub packages: Vec<PackageSpec>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            registry_url: String::new(),
            iterations: 2,
            compare_versions: false,
            skip_tls: false,
            workspace_root: PathBuf::from("."),
            mirror_binary: "oc-mirror".to_string(),
            poll_interval_ms: 1000,
            stop_grace_ms: 500,
            describe: true,
            disk_monitoring: true,
            catalog: DEFAULT_CATALOG.to_string(),
            packages: default_packages(),
        }
    }
}

impl HarnessConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from `path`. The file must exist.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "loaded harness configuration");
        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults when absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Pretty TOML rendering of this configuration.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `~/.config/mirrorperf/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mirrorperf").join("config.toml"))
    }

    /// Pick the config file: explicit path, then `MIRRORPERF_CONFIG`, then
    /// the default location if a file exists there.
    pub fn resolve_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
        if explicit.is_some() {
            return explicit;
        }
        if let Ok(from_env) = std::env::var(CONFIG_ENV_VAR) {
            if !from_env.is_empty() {
                return Some(PathBuf::from(from_env));
            }
        }
        Self::default_path().filter(|path| path.exists())
    }

    /// Check the configuration before any iteration runs.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.registry_url.trim().is_empty() {
            return Err(ConfigError::Validation("registry URL is required".to_string()));
        }
        if self.iterations < 1 {
            return Err(ConfigError::Validation(
                "iterations must be at least 1".to_string(),
            ));
        }
        if self.iterations < 2 && !self.compare_versions {
            return Err(ConfigError::Validation(
                "iterations must be at least 2 for clean vs cached comparison".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Total iterations across all version groups.
    pub fn effective_iterations(&self) -> u32 {
        if self.compare_versions {
            self.iterations * 2
        } else {
            self.iterations
        }
    }

    /// Registry URL with a transport prefix; bare hosts get `docker://`.
    pub fn normalized_registry_url(&self) -> String {
        if self.registry_url.contains("://") {
            self.registry_url.clone()
        } else {
            format!("docker://{}", self.registry_url)
        }
    }

    /// Host and port the registry listens on.
    pub fn registry_address(&self) -> RegistryAddress {
        RegistryAddress::parse(&self.registry_url)
    }

    /// Sampling cadence as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Stop grace period as a `Duration`.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Anchor a relative `workspace_root` at the current directory.
    ///
    /// Paths handed to a tool running inside the workspace must be absolute.
    pub fn with_absolute_workspace(mut self) -> ConfigResult<Self> {
        if self.workspace_root.is_relative() {
            let root = std::env::current_dir()?.join(&self.workspace_root);
            debug!(root = %root.display(), "resolved relative workspace root");
            self.workspace_root = root;
        }
        Ok(self)
    }

    /// Workspace layout rooted at `workspace_root`.
    pub fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout::new(self.workspace_root.clone())
    }
}

impl fmt::Display for HarnessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.compare_versions {
            "v1/v2 comparison"
        } else {
            "standard"
        };
        write!(
            f,
            "registry={} iterations={} mode={} skip_tls={}",
            self.registry_url, self.iterations, mode, self.skip_tls
        )
    }
}

/// `host:port` of the destination registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAddress {
    /// Hostname or IP
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl RegistryAddress {
    /// Extract host and port from a registry URL, stripping scheme and path.
    pub fn parse(url: &str) -> Self {
        let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
        let authority = without_scheme.split('/').next().unwrap_or_default();

        match authority.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => Self {
                    host: host.to_string(),
                    port,
                },
                Err(_) => Self {
                    host: authority.to_string(),
                    port: DEFAULT_REGISTRY_PORT,
                },
            },
            None => Self {
                host: authority.to_string(),
                port: DEFAULT_REGISTRY_PORT,
            },
        }
    }
}

impl fmt::Display for RegistryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
