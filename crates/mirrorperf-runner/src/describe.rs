//! Parsing `oc-mirror describe` output.
//!
//! Describe reports what a mirror directory actually contains, so its counts
//! are preferred over the log-derived ones whenever both exist.

use crate::error::{Result, RunnerError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const IMAGE_REGISTRIES: [&str; 3] = [
    "registry.redhat.io/",
    "registry.access.redhat.com/",
    "quay.io/",
];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MirrorMetadata {
    #[serde(default)]
    past_mirror: PastMirror,
}

#[derive(Debug, Default, Deserialize)]
struct PastMirror {
    #[serde(default)]
    operators: Vec<OperatorEntry>,
    #[serde(default)]
    associations: Vec<Association>,
}

#[derive(Debug, Default, Deserialize)]
struct OperatorEntry {
    #[serde(default)]
    catalog: String,
    #[serde(default)]
    packages: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Association {
    #[serde(default)]
    name: String,
    #[serde(default)]
    layer_digests: Vec<String>,
    #[serde(default)]
    manifest_digests: Vec<String>,
}

/// Content counts for one mirror directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeMetrics {
    /// Distinct images hosted on a known upstream registry
    pub total_images: u32,
    /// Manifest digests across all associations
    pub total_manifests: u32,
    /// Distinct layer digests
    pub total_layers: u32,
    /// Associations recorded
    pub total_associations: u32,
    /// Operator packages across all catalogs
    pub operator_packages: u32,
    /// Distinct catalogs in first-seen order
    pub catalogs: Vec<String>,
}

impl DescribeMetrics {
    /// Parse raw describe output; anything before the first `{` is ignored.
    pub fn parse(output: &str) -> Result<Self> {
        let start = output
            .find('{')
            .ok_or_else(|| RunnerError::Describe("no JSON found in describe output".into()))?;
        let metadata: MirrorMetadata = serde_json::from_str(&output[start..])
            .map_err(|e| RunnerError::Describe(format!("failed to parse describe JSON: {e}")))?;
        Ok(Self::from_metadata(&metadata))
    }

    fn from_metadata(metadata: &MirrorMetadata) -> Self {
        let past = &metadata.past_mirror;
        let mut images = HashSet::new();
        let mut layers = HashSet::new();
        let mut manifests = 0u32;

        for assoc in &past.associations {
            if IMAGE_REGISTRIES.iter().any(|r| assoc.name.contains(r)) {
                images.insert(assoc.name.as_str());
            }
            manifests += assoc.manifest_digests.len() as u32;
            layers.extend(assoc.layer_digests.iter().map(String::as_str));
        }

        let mut catalogs: Vec<String> = Vec::new();
        let mut packages = 0u32;
        for op in &past.operators {
            packages += op.packages.len() as u32;
            if !catalogs.contains(&op.catalog) {
                catalogs.push(op.catalog.clone());
            }
        }

        Self {
            total_images: images.len() as u32,
            total_manifests: manifests,
            total_layers: layers.len() as u32,
            total_associations: past.associations.len() as u32,
            operator_packages: packages,
            catalogs,
        }
    }

    /// Multi-line human summary.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Total Images: {}\nTotal Layers: {}\nTotal Manifests: {}\nTotal Associations: {}\nOperator Packages: {}",
            self.total_images,
            self.total_layers,
            self.total_manifests,
            self.total_associations,
            self.operator_packages
        );
        if !self.catalogs.is_empty() {
            out.push_str(&format!("\nCatalogs: {}", self.catalogs.len()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIBE: &str = r#"W1018 warning: using default config
{
  "kind": "Metadata",
  "apiVersion": "mirror.openshift.io/v1alpha2",
  "pastMirror": {
    "operators": [
      {"catalog": "registry.redhat.io/redhat/redhat-operator-index:v4.19",
       "packages": [{"name": "web-terminal"}, {"name": "cluster-logging"}]},
      {"catalog": "registry.redhat.io/redhat/redhat-operator-index:v4.19",
       "packages": [{"name": "devworkspace-operator"}]}
    ],
    "associations": [
      {"name": "registry.redhat.io/web-terminal/operator:1.0",
       "layerDigests": ["sha256:a", "sha256:b"], "manifestDigests": ["sha256:m1"]},
      {"name": "registry.redhat.io/web-terminal/operator:1.0",
       "layerDigests": ["sha256:b"], "manifestDigests": ["sha256:m2", "sha256:m3"]},
      {"name": "local/index", "layerDigests": ["sha256:c"]}
    ]
  }
}"#;

    #[test]
    fn counts_distinct_content() {
        let metrics = DescribeMetrics::parse(DESCRIBE).unwrap();
        assert_eq!(metrics.total_images, 1);
        assert_eq!(metrics.total_layers, 3);
        assert_eq!(metrics.total_manifests, 3);
        assert_eq!(metrics.total_associations, 3);
        assert_eq!(metrics.operator_packages, 3);
        assert_eq!(metrics.catalogs.len(), 1);
        assert!(metrics.summary().contains("Catalogs: 1"));
    }

    #[test]
    fn missing_json_is_an_error() {
        let err = DescribeMetrics::parse("error: no metadata found").unwrap_err();
        assert!(matches!(err, RunnerError::Describe(_)));
        assert!(DescribeMetrics::parse("{ broken").is_err());
    }

    #[test]
    fn empty_metadata_counts_nothing() {
        let metrics = DescribeMetrics::parse("{}").unwrap();
        assert_eq!(metrics, DescribeMetrics::default());
    }
}
