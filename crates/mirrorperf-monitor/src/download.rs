//! Download progress into a mirror directory.
//!
//! Like the disk-write monitor, but bytes are counted net of what the
//! directory already held at start, and every tick publishes a
//! [`DownloadProgress`] on a bounded channel for live display.

use crate::format::{duration_secs, format_bytes_human, rate_mbs, MIB};
use crate::session::{DoubleStart, PollingSession, Sampler, Tick, Window};
use crate::sources::dir::dir_stats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::trace;

/// Capacity of the progress channel. Updates beyond it are dropped.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 100;

/// Download monitor over one destination directory.
pub type DownloadMonitor = PollingSession<DownloadSampler>;

impl PollingSession<DownloadSampler> {
    /// Monitor downloads landing beneath `dir`.
    pub fn for_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(DownloadSampler::new(dir.into()))
    }

    /// Take the receiving end of the progress channel for the current session.
    ///
    /// Returns `None` once taken. The channel closes when the session stops.
    pub fn take_progress(&self) -> Option<mpsc::Receiver<DownloadProgress>> {
        self.with_sampler(|sampler| sampler.progress_rx.take())
    }
}

/// Directory growth at one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadSample {
    /// When the walk finished
    pub timestamp: DateTime<Utc>,
    /// Bytes added since start, never negative
    pub total_bytes: u64,
    /// Signed change since the previous tick
    pub bytes_delta: i64,
    /// MiB/s since the previous tick; negative when the directory shrank
    pub download_rate_mbs: f64,
    /// Files under the directory
    pub file_count: u64,
}

/// Live progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Time since start
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    /// Bytes added since start
    pub total_bytes: u64,
    /// Rate over the last tick
    pub current_rate_mbs: f64,
    /// Mean rate so far
    pub average_rate_mbs: f64,
    /// Files under the directory
    pub file_count: u64,
}

/// Aggregate download activity over a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadMetrics {
    /// Bytes added since start, clamped at zero
    pub total_bytes_downloaded: u64,
    /// Files under the directory at the end
    pub total_files: u64,
    /// Session wall time
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Mean rate over non-negative samples
    pub average_speed_mbs: f64,
    /// Highest rate
    pub peak_speed_mbs: f64,
    /// Lowest positive rate
    pub min_speed_mbs: f64,
    /// Raw samples
    pub samples: Vec<DownloadSample>,
    /// Session start
    pub start_time: DateTime<Utc>,
    /// Session end
    pub end_time: DateTime<Utc>,
}

impl DownloadMetrics {
    /// Average over peak, zero without a peak.
    pub fn efficiency(&self) -> f64 {
        if self.peak_speed_mbs > 0.0 {
            self.average_speed_mbs / self.peak_speed_mbs
        } else {
            0.0
        }
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        format!(
            "Total: {} | Avg Speed: {:.2} MB/s | Peak: {:.2} MB/s | Files: {}",
            format_bytes_human(self.total_bytes_downloaded),
            self.average_speed_mbs,
            self.peak_speed_mbs,
            self.total_files
        )
    }
}

/// Walks the destination each tick and publishes progress.
pub struct DownloadSampler {
    dir: PathBuf,
    initial_bytes: u64,
    previous: Option<(u64, Instant)>,
    rate_sum: f64,
    rate_count: u32,
    progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    progress_rx: Option<mpsc::Receiver<DownloadProgress>>,
}

impl DownloadSampler {
    /// Sampler for `dir`.
    pub fn new(dir: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            dir,
            initial_bytes: 0,
            previous: None,
            rate_sum: 0.0,
            rate_count: 0,
            progress_tx: Some(tx),
            progress_rx: Some(rx),
        }
    }

    /// Directory size recorded at start.
    pub fn initial_bytes(&self) -> u64 {
        self.initial_bytes
    }

    fn publish(&self, progress: DownloadProgress) {
        if let Some(tx) = &self.progress_tx {
            if tx.try_send(progress).is_err() {
                trace!("download progress update dropped");
            }
        }
    }
}

impl Sampler for DownloadSampler {
    type Sample = DownloadSample;
    type Metrics = DownloadMetrics;
    const KIND: &'static str = "download";
    const DOUBLE_START: DoubleStart = DoubleStart::Ignore;

    fn begin(&mut self, _tick: &Tick) {
        if self.progress_tx.is_none() {
            let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
            self.progress_tx = Some(tx);
            self.progress_rx = Some(rx);
        }
        self.initial_bytes = dir_stats(&self.dir).bytes;
        self.previous = Some((self.initial_bytes, Instant::now()));
        self.rate_sum = 0.0;
        self.rate_count = 0;
    }

    fn sample(&mut self, tick: &Tick) -> DownloadSample {
        let stats = dir_stats(&self.dir);
        let now = Instant::now();
        let (last_bytes, last_at) = self.previous.unwrap_or((self.initial_bytes, now));
        let bytes_delta = stats.bytes as i64 - last_bytes as i64;
        let elapsed = now.saturating_duration_since(last_at).as_secs_f64();
        let download_rate_mbs = if elapsed > 0.0 {
            bytes_delta as f64 / elapsed / MIB
        } else {
            0.0
        };
        self.previous = Some((stats.bytes, now));

        if download_rate_mbs >= 0.0 {
            self.rate_sum += download_rate_mbs;
            self.rate_count += 1;
        }
        let total_bytes = stats.bytes.saturating_sub(self.initial_bytes);

        self.publish(DownloadProgress {
            elapsed: tick.since_start,
            total_bytes,
            current_rate_mbs: download_rate_mbs,
            average_rate_mbs: if self.rate_count > 0 {
                self.rate_sum / f64::from(self.rate_count)
            } else {
                0.0
            },
            file_count: stats.files,
        });

        DownloadSample {
            timestamp: Utc::now(),
            total_bytes,
            bytes_delta,
            download_rate_mbs,
            file_count: stats.files,
        }
    }

    fn aggregate(&self, samples: &[DownloadSample], window: &Window) -> DownloadMetrics {
        let mut metrics = DownloadMetrics {
            duration: window.duration,
            samples: samples.to_vec(),
            start_time: window.started_at,
            end_time: window.ended_at,
            ..Default::default()
        };

        let Some(last) = samples.last() else {
            let stats = dir_stats(&self.dir);
            metrics.total_bytes_downloaded = stats.bytes.saturating_sub(self.initial_bytes);
            metrics.total_files = stats.files;
            metrics.average_speed_mbs =
                rate_mbs(metrics.total_bytes_downloaded as f64, window.duration);
            return metrics;
        };
        metrics.total_bytes_downloaded = last.total_bytes;
        metrics.total_files = last.file_count;

        let valid: Vec<f64> = samples
            .iter()
            .map(|s| s.download_rate_mbs)
            .filter(|rate| *rate >= 0.0)
            .collect();
        metrics.average_speed_mbs = if valid.is_empty() {
            rate_mbs(metrics.total_bytes_downloaded as f64, window.duration)
        } else {
            valid.iter().sum::<f64>() / valid.len() as f64
        };
        metrics.peak_speed_mbs = valid.iter().copied().fold(0.0, f64::max);
        metrics.min_speed_mbs = valid
            .iter()
            .copied()
            .filter(|rate| *rate > 0.0)
            .reduce(f64::min)
            .unwrap_or(0.0);
        metrics
    }

    fn finish(&mut self) {
        // Dropping the sender closes the channel for the consumer
        self.progress_tx = None;
    }
}
