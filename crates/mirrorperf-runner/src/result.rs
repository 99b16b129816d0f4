//! Per-iteration records and the figures derived from them.

use crate::describe::DescribeMetrics;
use crate::phase::PhaseMetrics;
use mirrorperf_config::Version;
use mirrorperf_monitor::format::MIB;
use mirrorperf_monitor::{format_bytes_human, format_duration, NetworkMetrics, OutputMetrics};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One iteration's complete record. Field names are stable in result files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// 1-based iteration within its version group
    pub iteration: u32,
    /// First iteration of its group, run against an emptied workspace
    pub is_clean_run: bool,
    /// Version group
    pub version: Version,
    /// Download phase
    pub download_phase: PhaseMetrics,
    /// Upload phase
    pub upload_phase: PhaseMetrics,
    /// Host bandwidth across both phases
    pub network_metrics: NetworkMetrics,
    /// Mirror directory after the iteration
    pub output_metrics: Option<OutputMetrics>,
    /// Describe counts, when available
    pub describe_metrics: Option<DescribeMetrics>,
    /// One-line summary
    pub summary: String,
}

fn run_label(is_clean_run: bool) -> &'static str {
    if is_clean_run {
        "CLEAN"
    } else {
        "CACHED"
    }
}

impl TestResult {
    /// Record with empty phases, for assembling an iteration.
    pub fn new(iteration: u32, version: Version) -> Self {
        Self {
            iteration,
            is_clean_run: iteration == 1,
            version,
            download_phase: PhaseMetrics::default(),
            upload_phase: PhaseMetrics::default(),
            network_metrics: NetworkMetrics::default(),
            output_metrics: None,
            describe_metrics: None,
            summary: String::new(),
        }
    }

    /// `CLEAN` or `CACHED`.
    pub fn run_label(&self) -> &'static str {
        run_label(self.is_clean_run)
    }

    /// Download plus upload wall time.
    pub fn total_time(&self) -> Duration {
        self.download_phase.wall_time + self.upload_phase.wall_time
    }

    /// Bytes downloaded plus bytes uploaded.
    pub fn total_bytes(&self) -> u64 {
        let downloaded = self
            .download_phase
            .download
            .as_ref()
            .map_or(0, |d| d.total_bytes_downloaded);
        downloaded + self.upload_phase.bytes_uploaded
    }

    /// MiB/s over both phases.
    pub fn average_speed_mbs(&self) -> f64 {
        let secs = self.total_time().as_secs_f64();
        if secs > 0.0 {
            self.total_bytes() as f64 / secs / MIB
        } else {
            0.0
        }
    }

    /// Share of download cache operations that were hits.
    pub fn cache_efficiency(&self) -> f64 {
        let hits = self.download_phase.cache_hits;
        let total = hits + self.download_phase.images_skipped;
        if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        }
    }

    /// One minus errors per processed image; 1.0 with no errors.
    pub fn success_rate(&self) -> f64 {
        let errors =
            self.download_phase.extended.error_count + self.upload_phase.extended.error_count;
        if errors == 0 {
            return 1.0;
        }
        let processed = self.download_phase.extended.images_processed
            + self.upload_phase.extended.images_processed;
        if processed > 0 {
            (1.0 - errors as f64 / processed as f64).max(0.0)
        } else {
            0.0
        }
    }

    /// Score out of 100: speed up to 40, cache efficiency and success rate
    /// up to 30 each.
    pub fn performance_score(&self) -> f64 {
        let speed = self.average_speed_mbs();
        let speed_points = if speed > 100.0 {
            40.0
        } else if speed > 50.0 {
            30.0
        } else if speed > 25.0 {
            20.0
        } else if speed > 10.0 {
            10.0
        } else {
            0.0
        };
        speed_points + self.cache_efficiency() * 30.0 + self.success_rate() * 30.0
    }

    /// Fill in `summary` from the phases.
    pub fn generate_summary(&mut self) {
        self.summary = format!(
            "Iteration {} ({}, {}): Download={}, Upload={}, Bytes={}, CacheHits={}",
            self.iteration,
            self.run_label(),
            self.version,
            format_duration(self.download_phase.wall_time),
            format_duration(self.upload_phase.wall_time),
            self.upload_phase.bytes_uploaded,
            self.download_phase.cache_hits
        );
    }

    /// Longer one-line description with human-readable sizes.
    pub fn format(&self) -> String {
        let downloaded = self
            .download_phase
            .download
            .as_ref()
            .map_or(0, |d| d.total_bytes_downloaded);
        format!(
            "Iteration {} ({}, {}): Total={}, Downloaded={}, Uploaded={}, CacheHits={}",
            self.iteration,
            self.run_label(),
            self.version,
            format_duration(self.total_time()),
            format_bytes_human(downloaded),
            format_bytes_human(self.upload_phase.bytes_uploaded),
            self.download_phase.cache_hits
        )
    }
}

impl PhaseMetrics {
    /// Bytes moved by this phase: downloaded if any, else uploaded.
    pub fn total_bytes(&self) -> u64 {
        match &self.download {
            Some(d) if d.total_bytes_downloaded > 0 => d.total_bytes_downloaded,
            _ => self.bytes_uploaded,
        }
    }

    /// MiB/s for this phase.
    pub fn average_speed_mbs(&self) -> f64 {
        if let Some(d) = &self.download {
            if d.average_speed_mbs > 0.0 {
                return d.average_speed_mbs;
            }
        }
        let secs = self.wall_time.as_secs_f64();
        if secs > 0.0 {
            self.bytes_uploaded as f64 / secs / MIB
        } else {
            0.0
        }
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        format!(
            "Time: {} | Bytes: {} | Speed: {:.2} MB/s | Cache Hits: {}",
            format_duration(self.wall_time),
            format_bytes_human(self.total_bytes()),
            self.average_speed_mbs(),
            self.cache_hits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorperf_monitor::DownloadMetrics;

    fn result() -> TestResult {
        let mut r = TestResult::new(1, Version::V2);
        r.download_phase.wall_time = Duration::from_secs(2);
        r.download_phase.download = Some(DownloadMetrics {
            total_bytes_downloaded: 300 * 1024 * 1024,
            ..DownloadMetrics::default()
        });
        r.download_phase.cache_hits = 3;
        r.download_phase.images_skipped = 1;
        r.upload_phase.wall_time = Duration::from_secs(1);
        r.upload_phase.bytes_uploaded = 100 * 1024 * 1024;
        r
    }

    #[test]
    fn derived_figures() {
        let r = result();
        assert!(r.is_clean_run);
        assert_eq!(r.total_time(), Duration::from_secs(3));
        assert_eq!(r.total_bytes(), 400 * 1024 * 1024);
        assert!((r.average_speed_mbs() - 400.0 / 3.0).abs() < 1e-9);
        assert!((r.cache_efficiency() - 0.75).abs() < 1e-9);
        assert_eq!(r.success_rate(), 1.0);
        assert!((r.performance_score() - (40.0 + 22.5 + 30.0)).abs() < 1e-9);
    }

    #[test]
    fn success_rate_with_errors() {
        let mut r = result();
        r.download_phase.extended.error_count = 1;
        r.download_phase.extended.images_processed = 4;
        assert!((r.success_rate() - 0.75).abs() < 1e-9);
        r.download_phase.extended.images_processed = 0;
        assert_eq!(r.success_rate(), 0.0);
    }

    #[test]
    fn summary_line() {
        let mut r = result();
        r.iteration = 2;
        r.is_clean_run = false;
        r.generate_summary();
        assert_eq!(
            r.summary,
            "Iteration 2 (CACHED, v2): Download=2.00s, Upload=1.00s, Bytes=104857600, CacheHits=3"
        );
        assert!(r.format().contains("Downloaded=300.00 MB"));
    }

    #[test]
    fn json_field_names_are_stable() {
        let json = serde_json::to_value(result()).unwrap();
        for key in [
            "iteration",
            "is_clean_run",
            "version",
            "download_phase",
            "upload_phase",
            "network_metrics",
            "output_metrics",
            "describe_metrics",
            "summary",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["version"], "v2");
        assert_eq!(json["download_phase"]["wall_time"], 2.0);
    }
}
