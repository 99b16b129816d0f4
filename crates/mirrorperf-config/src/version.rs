//! oc-mirror protocol versions and the per-version flag table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two oc-mirror generations the harness can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Version {
    /// Legacy oc-mirror (no `--v2` flag, no cache directory flag)
    V1,
    /// oc-mirror with `--v2`
    V2,
}

impl Version {
    /// Both versions in execution order for a comparison run.
    pub const ALL: [Version; 2] = [Version::V1, Version::V2];

    /// Short label used in file names and summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::V1 => "v1",
            Version::V2 => "v2",
        }
    }

    /// ImageSetConfiguration API version understood by this generation.
    pub fn api_version(&self) -> &'static str {
        match self {
            Version::V1 => "v1alpha2",
            Version::V2 => "v2alpha1",
        }
    }

    /// Whether the tool accepts `--cache-dir`.
    pub fn supports_cache_dir(&self) -> bool {
        matches!(self, Version::V2)
    }

    /// Whether the tool accepts `--skip-missing` and `--continue-on-error`.
    pub fn supports_lenient_flags(&self) -> bool {
        matches!(self, Version::V1)
    }

    /// Config file flag (`--config` for v1, `-c` for v2).
    pub fn config_flag(&self) -> &'static str {
        match self {
            Version::V1 => "--config",
            Version::V2 => "-c",
        }
    }

    /// Flag that disables destination TLS verification.
    pub fn skip_tls_flag(&self) -> &'static str {
        match self {
            Version::V1 => "--dest-skip-tls=true",
            Version::V2 => "--dest-tls-verify=false",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_table_differs_per_version() {
        assert_eq!(Version::V1.config_flag(), "--config");
        assert_eq!(Version::V2.config_flag(), "-c");
        assert!(Version::V2.supports_cache_dir());
        assert!(!Version::V1.supports_cache_dir());
        assert!(Version::V1.supports_lenient_flags());
        assert_eq!(Version::V1.api_version(), "v1alpha2");
        assert_eq!(Version::V2.api_version(), "v2alpha1");
    }

    #[test]
    fn serializes_lowercase() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            version: Version,
        }
        let toml_str = toml::to_string(&Wrapper { version: Version::V2 }).unwrap();
        assert_eq!(toml_str.trim(), "version = \"v2\"");
        let back: Wrapper = toml::from_str("version = \"v1\"").unwrap();
        assert_eq!(back.version, Version::V1);
    }
}
