//! ImageSetConfiguration documents consumed by oc-mirror.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Operator catalog mirrored by default.
pub const DEFAULT_CATALOG: &str = "registry.redhat.io/redhat/redhat-operator-index:v4.19";

const API_GROUP: &str = "mirror.openshift.io";
const KIND: &str = "ImageSetConfiguration";

/// One channel pinned to a version window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSpec {
    /// Channel name
    pub name: String,
    /// Lowest bundle version to mirror
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
    /// Highest bundle version to mirror
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_version: Option<String>,
}

/// One operator package and the channels to mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Package name in the catalog
    pub name: String,
    /// Channels to mirror
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
}

impl PackageSpec {
    fn pinned(name: &str, channel: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            channels: vec![ChannelSpec {
                name: channel.to_string(),
                min_version: Some(version.to_string()),
                max_version: Some(version.to_string()),
            }],
        }
    }
}

/// Catalog entry under `mirror.operators`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorCatalog {
    /// Catalog image reference
    pub catalog: String,
    /// Packages to mirror from the catalog
    pub packages: Vec<PackageSpec>,
}

/// `mirror` section of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSection {
    /// Operator catalogs
    pub operators: Vec<OperatorCatalog>,
}

/// Top-level ImageSetConfiguration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSetConfiguration {
    /// `mirror.openshift.io/<version>`
    pub api_version: String,
    /// Always `ImageSetConfiguration`
    pub kind: String,
    /// What to mirror
    pub mirror: MirrorSection,
}

impl ImageSetConfiguration {
    /// Build a document for a single catalog.
    pub fn new(api_version: &str, catalog: &str, packages: &[PackageSpec]) -> Self {
        Self {
            api_version: format!("{}/{}", API_GROUP, api_version),
            kind: KIND.to_string(),
            mirror: MirrorSection {
                operators: vec![OperatorCatalog {
                    catalog: catalog.to_string(),
                    packages: packages.to_vec(),
                }],
            },
        }
    }

    /// Render as YAML with a leading document marker.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        let body = serde_yaml::to_string(self)?;
        Ok(format!("---\n{}", body))
    }
}

/// Write an ImageSetConfiguration for `api_version` to `path`.
pub fn write_imageset_config(
    path: &Path,
    api_version: &str,
    catalog: &str,
    packages: &[PackageSpec],
) -> ConfigResult<()> {
    let document = ImageSetConfiguration::new(api_version, catalog, packages).to_yaml()?;
    std::fs::write(path, document).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), api_version, "wrote imageset configuration");
    Ok(())
}

/// Operator packages mirrored when the config file names none.
pub fn default_packages() -> Vec<PackageSpec> {
    const ODF: &str = "4.19.6-rhodf";
    let mut packages = vec![PackageSpec::pinned(
        "local-storage-operator",
        "stable",
        "4.19.0-202510142112",
    )];
    for name in [
        "odf-operator",
        "odf-dependencies",
        "cephcsi-operator",
        "mcg-operator",
        "ocs-client-operator",
        "ocs-operator",
        "odf-csi-addons-operator",
        "odf-prometheus-operator",
        "rook-ceph-operator",
        "recipe",
    ] {
        packages.push(PackageSpec::pinned(name, "stable-4.19", ODF));
    }
    packages.push(PackageSpec::pinned("cluster-logging", "stable-6.4", "6.4.0"));
    packages.push(PackageSpec::pinned("loki-operator", "stable-6.4", "6.4.0"));
    packages
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn yaml_uses_oc_mirror_field_names() {
        let yaml = ImageSetConfiguration::new("v2alpha1", DEFAULT_CATALOG, &default_packages())
            .to_yaml()
            .unwrap();
        assert!(yaml.starts_with("---\n"));
        assert!(yaml.contains("apiVersion: mirror.openshift.io/v2alpha1"));
        assert!(yaml.contains("kind: ImageSetConfiguration"));
        assert!(yaml.contains("minVersion: 4.19.6-rhodf"));
        assert!(yaml.contains("catalog: registry.redhat.io/redhat/redhat-operator-index:v4.19"));
    }

    #[test]
    fn written_file_parses_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("isc.yaml");
        write_imageset_config(&path, "v1alpha2", DEFAULT_CATALOG, &default_packages()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: ImageSetConfiguration = serde_yaml::from_str(&content).unwrap();
        assert_eq!(parsed.api_version, "mirror.openshift.io/v1alpha2");
        assert_eq!(parsed.mirror.operators[0].packages.len(), 13);
    }

    #[test]
    fn write_into_missing_dir_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("isc.yaml");
        let err = write_imageset_config(&path, "v2alpha1", DEFAULT_CATALOG, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Write { .. }));
    }
}
