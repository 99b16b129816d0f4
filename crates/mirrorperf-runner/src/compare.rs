//! Clean vs cached and version vs version comparisons.
//!
//! Comparisons are derived views: recomputed from results on demand and
//! never stored on their own.

use crate::result::TestResult;
use mirrorperf_config::Version;
use mirrorperf_monitor::format::MIB;
use mirrorperf_monitor::{compare_outputs, OutputComparison};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Which way a metric should move to count as better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Times, memory, CPU
    LowerIsBetter,
    /// Throughput
    HigherIsBetter,
    /// Counts that should match; no improvement figure
    Neutral,
}

/// Percentage by which `candidate` improves on `baseline` when lower is
/// better: `(baseline - candidate) / baseline * 100`.
///
/// Two zeros are no change; a zero baseline with a non-zero candidate has
/// no meaningful percentage.
pub fn improvement_percent(baseline: f64, candidate: f64) -> Option<f64> {
    if baseline == 0.0 {
        return (candidate == 0.0).then_some(0.0);
    }
    Some((baseline - candidate) / baseline * 100.0)
}

/// One metric, before and after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    /// Display name including the unit
    pub metric: String,
    /// Clean run, or the first version's clean run
    pub baseline: f64,
    /// Cached average, or the second version's clean run
    pub candidate: f64,
    /// Positive when the candidate is better
    pub improvement_percent: Option<f64>,
    /// Which way is better
    pub direction: Direction,
}

impl MetricComparison {
    /// Compare two values of one metric.
    pub fn new(metric: impl Into<String>, baseline: f64, candidate: f64, direction: Direction) -> Self {
        let improvement_percent = match direction {
            Direction::LowerIsBetter => improvement_percent(baseline, candidate),
            Direction::HigherIsBetter => improvement_percent(baseline, candidate).map(|p| -p),
            Direction::Neutral => None,
        };
        Self {
            metric: metric.into(),
            baseline,
            candidate,
            improvement_percent,
            direction,
        }
    }
}

/// Iteration 1 against the mean of the cached iterations of one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanVsCached {
    /// Version group
    pub version: Version,
    /// Cached iterations averaged
    pub cached_runs: usize,
    /// Download wall time, seconds
    pub download_time: MetricComparison,
    /// Upload wall time, seconds
    pub upload_time: MetricComparison,
    /// Bytes uploaded
    pub bytes_uploaded: MetricComparison,
    /// Download cache hits
    pub cache_hits: MetricComparison,
}

impl CleanVsCached {
    /// All compared metrics in display order.
    pub fn metrics(&self) -> [&MetricComparison; 4] {
        [
            &self.download_time,
            &self.upload_time,
            &self.bytes_uploaded,
            &self.cache_hits,
        ]
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Treat `results[0]` as the clean baseline and average the rest.
///
/// `None` with fewer than two results.
pub fn compare_clean_vs_cached(results: &[TestResult]) -> Option<CleanVsCached> {
    let (clean, cached) = results.split_first()?;
    if cached.is_empty() {
        return None;
    }

    let avg = |f: fn(&TestResult) -> f64| mean(cached.iter().map(f));
    let download = |r: &TestResult| r.download_phase.wall_time.as_secs_f64();
    let upload = |r: &TestResult| r.upload_phase.wall_time.as_secs_f64();
    let bytes = |r: &TestResult| r.upload_phase.bytes_uploaded as f64;
    let hits = |r: &TestResult| r.download_phase.cache_hits as f64;

    let comparison = CleanVsCached {
        version: clean.version,
        cached_runs: cached.len(),
        download_time: MetricComparison::new(
            "Download time (s)",
            download(clean),
            avg(download),
            Direction::LowerIsBetter,
        ),
        upload_time: MetricComparison::new(
            "Upload time (s)",
            upload(clean),
            avg(upload),
            Direction::LowerIsBetter,
        ),
        bytes_uploaded: MetricComparison::new(
            "Bytes uploaded",
            bytes(clean),
            avg(bytes),
            Direction::LowerIsBetter,
        ),
        cache_hits: MetricComparison::new("Cache hits", hits(clean), avg(hits), Direction::Neutral),
    };
    debug!(
        version = %comparison.version,
        cached_runs = comparison.cached_runs,
        download_improvement = ?comparison.download_time.improvement_percent,
        "compared clean and cached runs"
    );
    Some(comparison)
}

/// How much each version gains from its cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachingEffectiveness {
    /// Download time improvement of the first version's cached runs
    pub baseline_improvement_percent: Option<f64>,
    /// Download time improvement of the second version's cached runs
    pub candidate_improvement_percent: Option<f64>,
    /// Candidate minus baseline, in percentage points
    pub delta_points: Option<f64>,
}

/// First-iteration comparison of two version groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionComparison {
    /// First group's version
    pub baseline_version: Version,
    /// Second group's version
    pub candidate_version: Version,
    /// Per-metric deltas between the two clean runs
    pub metrics: Vec<MetricComparison>,
    /// Content equality of the two mirror outputs
    pub content: Option<OutputComparison>,
    /// Present when either group has cached runs
    pub caching_effectiveness: Option<CachingEffectiveness>,
}

impl VersionComparison {
    /// Look up one metric by name.
    pub fn metric(&self, name: &str) -> Option<&MetricComparison> {
        self.metrics.iter().find(|m| m.metric == name)
    }
}

fn clean_run_metrics(a: &TestResult, b: &TestResult) -> Vec<MetricComparison> {
    use Direction::*;

    let peak_memory = |r: &TestResult| {
        r.download_phase
            .resource
            .as_ref()
            .map_or(0.0, |m| m.memory_peak_mb)
    };
    let avg_cpu = |r: &TestResult| {
        r.download_phase
            .resource
            .as_ref()
            .map_or(0.0, |m| m.cpu_avg_percent)
    };

    let mut metrics = vec![
        MetricComparison::new(
            "Download time (s)",
            a.download_phase.wall_time.as_secs_f64(),
            b.download_phase.wall_time.as_secs_f64(),
            LowerIsBetter,
        ),
        MetricComparison::new(
            "Upload time (s)",
            a.upload_phase.wall_time.as_secs_f64(),
            b.upload_phase.wall_time.as_secs_f64(),
            LowerIsBetter,
        ),
        MetricComparison::new(
            "Total time (s)",
            a.total_time().as_secs_f64(),
            b.total_time().as_secs_f64(),
            LowerIsBetter,
        ),
        MetricComparison::new(
            "Average speed (MB/s)",
            a.average_speed_mbs(),
            b.average_speed_mbs(),
            HigherIsBetter,
        ),
        MetricComparison::new(
            "Bytes uploaded (MB)",
            a.upload_phase.bytes_uploaded as f64 / MIB,
            b.upload_phase.bytes_uploaded as f64 / MIB,
            Neutral,
        ),
        MetricComparison::new(
            "Cache hits",
            a.download_phase.cache_hits as f64,
            b.download_phase.cache_hits as f64,
            Neutral,
        ),
        MetricComparison::new("Peak memory (MB)", peak_memory(a), peak_memory(b), LowerIsBetter),
        MetricComparison::new("Average CPU (%)", avg_cpu(a), avg_cpu(b), LowerIsBetter),
        MetricComparison::new(
            "Average bandwidth (Mbps)",
            a.network_metrics.average_bandwidth_mbps,
            b.network_metrics.average_bandwidth_mbps,
            HigherIsBetter,
        ),
        MetricComparison::new(
            "Peak bandwidth (Mbps)",
            a.network_metrics.peak_bandwidth_mbps,
            b.network_metrics.peak_bandwidth_mbps,
            HigherIsBetter,
        ),
        MetricComparison::new(
            "Network transferred (MB)",
            a.network_metrics.total_bytes_transferred as f64 / MIB,
            b.network_metrics.total_bytes_transferred as f64 / MIB,
            Neutral,
        ),
    ];

    if let (Some(da), Some(db)) = (&a.describe_metrics, &b.describe_metrics) {
        for (name, x, y) in [
            ("Images", da.total_images, db.total_images),
            ("Layers", da.total_layers, db.total_layers),
            ("Manifests", da.total_manifests, db.total_manifests),
            ("Operator packages", da.operator_packages, db.operator_packages),
        ] {
            metrics.push(MetricComparison::new(name, x as f64, y as f64, Neutral));
        }
    }

    metrics
}

fn caching_effectiveness(a: &[TestResult], b: &[TestResult]) -> Option<CachingEffectiveness> {
    if a.len() < 2 && b.len() < 2 {
        return None;
    }
    let gain = |results: &[TestResult]| {
        compare_clean_vs_cached(results).and_then(|c| c.download_time.improvement_percent)
    };
    let baseline = gain(a);
    let candidate = gain(b);
    Some(CachingEffectiveness {
        baseline_improvement_percent: baseline,
        candidate_improvement_percent: candidate,
        delta_points: baseline.zip(candidate).map(|(x, y)| y - x),
    })
}

/// Compare the clean runs of two version groups.
///
/// With `outputs`, the two mirror directories are also checked for
/// identical content; a failed check is logged and left out. `None` when
/// either group is empty.
pub async fn compare_versions(
    baseline: &[TestResult],
    candidate: &[TestResult],
    outputs: Option<(&Path, &Path)>,
) -> Option<VersionComparison> {
    let a = baseline.first()?;
    let b = candidate.first()?;

    let content = match outputs {
        Some((first, second)) => match compare_outputs(first, second).await {
            Ok(comparison) => Some(comparison),
            Err(err) => {
                warn!(error = %err, "content comparison failed");
                None
            }
        },
        None => None,
    };

    Some(VersionComparison {
        baseline_version: a.version,
        candidate_version: b.version,
        metrics: clean_run_metrics(a, b),
        content,
        caching_effectiveness: caching_effectiveness(baseline, candidate),
    })
}
