//! Write throughput into a directory tree.

use crate::format::{duration_secs, format_bytes_human, rate_mbs};
use crate::session::{DoubleStart, PollingSession, Sampler, Tick, Window};
use crate::sources::dir::{dir_stats, DirStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Disk-write monitor over one directory.
pub type DiskWriteMonitor = PollingSession<DiskWriteSampler>;

impl PollingSession<DiskWriteSampler> {
    /// Monitor writes beneath `dir`.
    pub fn for_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(DiskWriteSampler::new(dir.into()))
    }
}

/// Directory size at one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskWriteSample {
    /// When the walk finished
    pub timestamp: DateTime<Utc>,
    /// Bytes under the directory
    pub total_bytes: u64,
    /// Files under the directory
    pub file_count: u64,
    /// MiB/s since the previous tick; zero on the first tick
    pub write_rate_mbs: f64,
}

/// Aggregate write activity over a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskWriteMetrics {
    /// Directory observed
    pub path: PathBuf,
    /// Bytes under the directory at the end of the session
    pub total_bytes_written: u64,
    /// Files under the directory at the end of the session
    pub total_files: u64,
    /// Session wall time
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Mean write rate over active samples
    pub average_write_rate_mbs: f64,
    /// Highest write rate
    pub peak_write_rate_mbs: f64,
    /// Raw samples
    pub samples: Vec<DiskWriteSample>,
}

impl DiskWriteMetrics {
    /// One-line summary.
    pub fn summary(&self) -> String {
        format!(
            "Written: {} | Files: {} | Avg: {:.2} MB/s | Peak: {:.2} MB/s",
            format_bytes_human(self.total_bytes_written),
            self.total_files,
            self.average_write_rate_mbs,
            self.peak_write_rate_mbs
        )
    }
}

/// Walks the directory each tick.
pub struct DiskWriteSampler {
    dir: PathBuf,
    previous: Option<(u64, Instant)>,
}

impl DiskWriteSampler {
    /// Sampler for `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir, previous: None }
    }
}

impl Sampler for DiskWriteSampler {
    type Sample = DiskWriteSample;
    type Metrics = DiskWriteMetrics;
    const KIND: &'static str = "disk-write";
    const DOUBLE_START: DoubleStart = DoubleStart::Ignore;

    fn begin(&mut self, _tick: &Tick) {
        self.previous = None;
    }

    fn sample(&mut self, _tick: &Tick) -> DiskWriteSample {
        let stats = dir_stats(&self.dir);
        let now = Instant::now();
        let write_rate_mbs = match self.previous {
            Some((bytes, at)) => rate_mbs(
                stats.bytes.saturating_sub(bytes) as f64,
                now.saturating_duration_since(at),
            ),
            None => 0.0,
        };
        self.previous = Some((stats.bytes, now));

        DiskWriteSample {
            timestamp: Utc::now(),
            total_bytes: stats.bytes,
            file_count: stats.files,
            write_rate_mbs,
        }
    }

    fn aggregate(&self, samples: &[DiskWriteSample], window: &Window) -> DiskWriteMetrics {
        let last = match samples.last() {
            Some(last) => DirStats {
                bytes: last.total_bytes,
                files: last.file_count,
            },
            None => dir_stats(&self.dir),
        };

        let active: Vec<f64> = samples
            .iter()
            .map(|s| s.write_rate_mbs)
            .filter(|rate| *rate > 0.0)
            .collect();
        let average_write_rate_mbs = if active.is_empty() {
            rate_mbs(last.bytes as f64, window.duration)
        } else {
            active.iter().sum::<f64>() / active.len() as f64
        };

        DiskWriteMetrics {
            path: self.dir.clone(),
            total_bytes_written: last.bytes,
            total_files: last.files,
            duration: window.duration,
            average_write_rate_mbs,
            peak_write_rate_mbs: active.iter().copied().fold(0.0, f64::max),
            samples: samples.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn empty_session_reads_final_size() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("blob"), vec![0u8; 2 * 1024 * 1024]).unwrap();

        let sampler = DiskWriteSampler::new(dir.path().to_path_buf());
        let now = Utc::now();
        let metrics = sampler.aggregate(
            &[],
            &Window {
                started_at: now,
                ended_at: now,
                duration: Duration::from_secs(2),
                complete: true,
            },
        );
        assert_eq!(metrics.total_bytes_written, 2 * 1024 * 1024);
        assert_eq!(metrics.total_files, 1);
        assert_eq!(metrics.average_write_rate_mbs, 1.0);
        assert_eq!(metrics.peak_write_rate_mbs, 0.0);
    }

    #[test]
    fn first_tick_has_no_rate() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), b"hello").unwrap();
        let mut sampler = DiskWriteSampler::new(dir.path().to_path_buf());
        let tick = Tick {
            at: Utc::now(),
            pid: None,
            since_start: Duration::ZERO,
        };
        sampler.begin(&tick);
        let first = sampler.sample(&tick);
        assert_eq!(first.write_rate_mbs, 0.0);
        assert_eq!(first.total_bytes, 5);
    }

    #[tokio::test]
    async fn observes_growth() {
        let dir = TempDir::new().unwrap();
        let monitor = DiskWriteMonitor::for_dir(dir.path())
            .with_poll_interval(Duration::from_millis(20))
            .with_stop_grace(Duration::from_millis(20));
        monitor.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        fs::write(dir.path().join("layer"), vec![1u8; 4096]).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let metrics = monitor.stop().await;

        assert_eq!(metrics.total_bytes_written, 4096);
        assert_eq!(metrics.total_files, 1);
        assert!(metrics.peak_write_rate_mbs > 0.0);
    }
}
