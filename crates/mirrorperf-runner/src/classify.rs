//! Best-effort counters mined from the mirror tool's log lines.
//!
//! Nothing here fails: a line that matches no pattern simply contributes
//! nothing. Counts are one per matching line, however many patterns in a
//! group match it.

use crate::executor::CommandOutput;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

const MAX_LINE_CHARS: usize = 200;
const MAX_WARNINGS_KEPT: usize = 20;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
}

lazy_static! {
    static ref SKIPPED_IMAGE: Vec<Regex> = compile(&[
        r"(?i)skipped.*image",
        r"(?i)image.*skipped",
        r"(?i)already.*exists",
        r"(?i)using.*cached",
    ]);
    static ref CACHE_HIT: Vec<Regex> = compile(&[
        r"(?i)cache.*hit",
        r"(?i)using.*cache",
        r"(?i)cached.*image",
        r"(?i)found.*cache",
    ]);
    static ref BYTE_ANNOTATION: Vec<Regex> = compile(&[
        r"(?i)(?P<n>\d+)\s*(?:bytes|B)\s+(?:uploaded|transferred|sent)",
        r"(?i)uploaded.*?(?P<n>\d+)\s*(?:bytes|B)\b",
        r"(?i)(?P<n>\d+(?:\.\d+)?)\s*(?P<unit>KB|MB|GB)\b",
        r"(?i)transferred.*?(?P<n>\d+)\s*(?:bytes|B)\b",
    ]);
    static ref SIZE_ANNOTATION: Vec<Regex> =
        compile(&[r"(?i)size[:\s]+(?P<n>\d+(?:\.\d+)?)\s*(?P<unit>KB|MB|GB|bytes?)\b"]);
    static ref IMAGE: Vec<Regex> = compile(&[
        r"(?i)copying\s+image",
        r"(?i)mirroring\s+image",
        r"(?i)processing\s+image",
        r"(?i)image.*copied",
    ]);
    static ref LAYER: Vec<Regex> = compile(&[
        r"(?i)copying\s+blob",
        r"(?i)layer\s+sha256",
        r"(?i)blob\s+sha256",
        r"(?i)uploading.*blob",
    ]);
    static ref MANIFEST: Vec<Regex> = compile(&[
        r"(?i)copying\s+manifest",
        r"(?i)manifest.*copied",
        r"(?i)writing\s+manifest",
    ]);
    static ref ERROR: Vec<Regex> = compile(&[
        r"(?i)^error:",
        r"(?i)\berror\b.*:",
        r"(?i)failed\s+to",
        r"(?i)unable\s+to",
    ]);
    static ref RETRY: Vec<Regex> = compile(&[r"(?i)retry", r"(?i)retrying", r"(?i)attempt\s+\d+"]);
    static ref WARNING: Vec<Regex> = compile(&[r"(?i)^warn", r"(?i)^W\d+", r"(?i)warning:"]);
    static ref SKIPPING: Vec<Regex> = compile(&[
        r"(?i)skipping",
        r"(?i)already\s+exists",
        r"(?i)exists.*skipping",
    ]);
    static ref OPERATOR: Vec<Regex> = compile(&[r"(?i)operator[:\s]+(?P<name>[a-zA-Z0-9_-]+)"]);
    static ref CATALOG: Vec<Regex> = compile(&[r"(?i)catalog.*mirrored|mirroring.*catalog"]);
}

fn any_match(patterns: &[Regex], line: &str) -> bool {
    patterns.iter().any(|p| p.is_match(line))
}

fn first_captures<'l>(patterns: &[Regex], line: &'l str) -> Option<Captures<'l>> {
    patterns.iter().find_map(|p| p.captures(line))
}

fn unit_multiplier(unit: Option<&str>) -> f64 {
    match unit.map(str::to_ascii_lowercase).as_deref() {
        Some("kb") => 1024.0,
        Some("mb") => 1024.0 * 1024.0,
        Some("gb") => 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    }
}

fn captured_bytes(captures: &Captures<'_>) -> Option<u64> {
    let value: f64 = captures.name("n")?.as_str().parse().ok()?;
    let unit = captures.name("unit").map(|m| m.as_str());
    Some((value * unit_multiplier(unit)) as u64)
}

fn contains_skip(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("skip") || lower.contains("exists") || lower.contains("cached")
}

fn truncate_line(line: &str) -> String {
    if line.chars().count() <= MAX_LINE_CHARS {
        return line.to_string();
    }
    let mut out: String = line.chars().take(MAX_LINE_CHARS - 3).collect();
    out.push_str("...");
    out
}

/// Detailed log counters for one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedMetrics {
    /// Lines announcing an image copy
    pub images_processed: u32,
    /// Image lines that were not skips
    pub images_copied: u32,
    /// Skip lines mentioning an image
    pub images_skipped: u32,
    /// Lines announcing a layer or blob
    pub layers_processed: u32,
    /// Layer lines that were not skips
    pub layers_copied: u32,
    /// Layer lines that were skips
    pub layers_skipped: u32,
    /// Manifest lines
    pub manifests_processed: u32,
    /// Lines mentioning a blob at all
    pub blobs_processed: u32,
    /// Error lines
    pub error_count: u32,
    /// Retry lines
    pub retry_count: u32,
    /// Warning lines
    pub warning_count: u32,
    /// Error lines, truncated
    pub errors: Vec<String>,
    /// First warning lines, truncated
    pub warnings: Vec<String>,
    /// Distinct operator names in first-seen order
    pub operators_found: Vec<String>,
    /// Catalog mirroring lines
    pub catalogs_mirrored: u32,
}

impl ExtendedMetrics {
    /// Multi-line human summary.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        if self.images_processed > 0 || self.images_copied > 0 || self.images_skipped > 0 {
            out.push_str(&format!(
                "Images: {} processed | {} copied | {} skipped\n",
                self.images_processed, self.images_copied, self.images_skipped
            ));
        }
        if self.layers_processed > 0 || self.layers_copied > 0 || self.layers_skipped > 0 {
            out.push_str(&format!(
                "Layers/Blobs: {} processed | {} copied | {} skipped\n",
                self.layers_processed, self.layers_copied, self.layers_skipped
            ));
        }
        if self.manifests_processed > 0 || self.catalogs_mirrored > 0 {
            out.push_str(&format!(
                "Manifests: {} | Catalogs: {}\n",
                self.manifests_processed, self.catalogs_mirrored
            ));
        }
        out.push_str(&format!(
            "Errors: {} | Retries: {} | Warnings: {}",
            self.error_count, self.retry_count, self.warning_count
        ));
        out
    }
}

impl CommandOutput {
    /// Lines reporting an image skipped because it already exists.
    pub fn count_skipped_images(&self) -> u32 {
        self.logs
            .iter()
            .filter(|line| any_match(&SKIPPED_IMAGE, line))
            .count() as u32
    }

    /// Lines reporting a cache hit.
    pub fn count_cache_hits(&self) -> u32 {
        self.logs
            .iter()
            .filter(|line| any_match(&CACHE_HIT, line))
            .count() as u32
    }

    /// Bytes uploaded according to the logs.
    ///
    /// A line containing "total" is a cumulative counter and the last one
    /// wins. Without one, the largest annotation wins. With no annotations
    /// at all, every `size: N unit` annotation is summed.
    pub fn extract_bytes_uploaded(&self) -> u64 {
        let mut last_total = None;
        let mut largest = 0u64;

        for line in &self.logs {
            let Some(bytes) = first_captures(&BYTE_ANNOTATION, line)
                .as_ref()
                .and_then(captured_bytes)
            else {
                continue;
            };
            if line.to_lowercase().contains("total") {
                last_total = Some(bytes);
            }
            largest = largest.max(bytes);
        }

        match last_total {
            Some(total) => total,
            None if largest > 0 => largest,
            None => self.sum_size_annotations(),
        }
    }

    fn sum_size_annotations(&self) -> u64 {
        self.logs
            .iter()
            .filter_map(|line| first_captures(&SIZE_ANNOTATION, line))
            .filter_map(|captures| captured_bytes(&captures))
            .sum()
    }

    /// Detailed counters over every log line.
    pub fn extract_extended_metrics(&self) -> ExtendedMetrics {
        let mut metrics = ExtendedMetrics::default();

        for line in &self.logs {
            if any_match(&IMAGE, line) {
                metrics.images_processed += 1;
                if !contains_skip(line) {
                    metrics.images_copied += 1;
                }
            }

            if any_match(&LAYER, line) {
                metrics.layers_processed += 1;
                if contains_skip(line) {
                    metrics.layers_skipped += 1;
                } else {
                    metrics.layers_copied += 1;
                }
            }

            if any_match(&MANIFEST, line) {
                metrics.manifests_processed += 1;
            }

            if line.to_lowercase().contains("blob") {
                metrics.blobs_processed += 1;
            }

            if any_match(&ERROR, line) {
                metrics.error_count += 1;
                metrics.errors.push(truncate_line(line));
            }

            if any_match(&RETRY, line) {
                metrics.retry_count += 1;
            }

            if any_match(&WARNING, line) {
                metrics.warning_count += 1;
                if metrics.warnings.len() < MAX_WARNINGS_KEPT {
                    metrics.warnings.push(truncate_line(line));
                }
            }

            if any_match(&SKIPPING, line) && line.to_lowercase().contains("image") {
                metrics.images_skipped += 1;
            }

            if let Some(name) = first_captures(&OPERATOR, line).and_then(|c| c.name("name")) {
                let name = name.as_str();
                if !metrics.operators_found.iter().any(|known| known == name) {
                    metrics.operators_found.push(name.to_string());
                }
            }

            if any_match(&CATALOG, line) {
                metrics.catalogs_mirrored += 1;
            }
        }

        metrics
    }
}
