//! CPU, memory and thread usage of one process.

use crate::format::{duration_secs, MIB};
use crate::session::{DoubleStart, PollingSession, Sampler, Tick, Window};
use crate::sources::process::{self, ProcessStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Resource monitor over the target process, or this process when no
/// target has been set.
pub type ResourceMonitor = PollingSession<ResourceSampler>;

impl PollingSession<ResourceSampler> {
    /// Monitor targeting the current process until retargeted.
    pub fn current_process() -> Self {
        Self::new(ResourceSampler::default())
    }
}

/// One reading of the target process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
    /// Process id the reading belongs to
    pub pid: u32,
    /// CPU usage since the previous reading, normalized over all cores
    pub cpu_percent: f64,
    /// Resident set size in bytes
    pub memory_rss: u64,
    /// Virtual memory size in bytes
    pub memory_vms: u64,
    /// RSS as a share of physical memory
    pub memory_percent: f64,
    /// OS threads of the target
    pub threads: u64,
    /// Live tasks on the harness' own async runtime
    pub runtime_tasks: u64,
}

/// Aggregate resource usage over a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    /// Session wall time
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Mean CPU%
    pub cpu_avg_percent: f64,
    /// Highest CPU%
    pub cpu_peak_percent: f64,
    /// Mean RSS in MiB
    pub memory_avg_mb: f64,
    /// Highest RSS in MiB
    pub memory_peak_mb: f64,
    /// Highest RSS in bytes
    pub memory_peak_rss: u64,
    /// Mean thread count
    pub avg_threads: f64,
    /// Highest thread count
    pub peak_threads: u64,
    /// Mean runtime task count
    pub avg_runtime_tasks: f64,
    /// Highest runtime task count
    pub peak_runtime_tasks: u64,
    /// Number of samples folded in
    pub sample_count: usize,
    /// Raw samples
    pub samples: Vec<ResourceSample>,
}

impl ResourceMetrics {
    /// One-line summary.
    pub fn summary(&self) -> String {
        format!(
            "CPU: Avg {:.2}% | Peak {:.2}% | Memory: Avg {:.2} MB | Peak {:.2} MB | Threads: Avg {:.0} | Peak {}",
            self.cpu_avg_percent,
            self.cpu_peak_percent,
            self.memory_avg_mb,
            self.memory_peak_mb,
            self.avg_threads,
            self.peak_threads
        )
    }
}

/// Reads `/proc/<pid>` each tick and derives CPU% from consecutive tick counts.
pub struct ResourceSampler {
    clock_ticks: f64,
    cpus: f64,
    total_memory: u64,
    previous: Option<(u32, u64, Instant)>,
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self {
            clock_ticks: process::clock_ticks_per_second() as f64,
            cpus: process::cpu_count() as f64,
            total_memory: process::total_memory_bytes(),
            previous: None,
        }
    }
}

impl ResourceSampler {
    fn cpu_percent(&mut self, pid: u32, stats: &ProcessStats, now: Instant) -> f64 {
        let percent = match self.previous {
            Some((prev_pid, prev_ticks, prev_at)) if prev_pid == pid => {
                let elapsed = now.saturating_duration_since(prev_at).as_secs_f64();
                if elapsed > 0.0 {
                    let cpu_secs = stats.cpu_ticks.saturating_sub(prev_ticks) as f64 / self.clock_ticks;
                    cpu_secs / elapsed * 100.0 / self.cpus
                } else {
                    0.0
                }
            }
            // First reading for this pid has no previous value
            _ => 0.0,
        };
        self.previous = Some((pid, stats.cpu_ticks, now));
        percent
    }
}

impl Sampler for ResourceSampler {
    type Sample = ResourceSample;
    type Metrics = ResourceMetrics;
    const KIND: &'static str = "resource";
    const DOUBLE_START: DoubleStart = DoubleStart::Ignore;

    fn begin(&mut self, tick: &Tick) {
        self.previous = None;
        let pid = tick.pid.unwrap_or_else(std::process::id);
        if let Some(stats) = process::read_process_stats(pid) {
            self.previous = Some((pid, stats.cpu_ticks, Instant::now()));
        }
    }

    fn sample(&mut self, tick: &Tick) -> ResourceSample {
        let pid = tick.pid.unwrap_or_else(std::process::id);
        let runtime_tasks = tokio::runtime::Handle::try_current()
            .map(|handle| handle.metrics().num_alive_tasks() as u64)
            .unwrap_or(0);

        let Some(stats) = process::read_process_stats(pid) else {
            return ResourceSample {
                timestamp: tick.at,
                pid,
                runtime_tasks,
                ..Default::default()
            };
        };

        let cpu_percent = self.cpu_percent(pid, &stats, Instant::now());
        let memory_percent = if self.total_memory > 0 {
            stats.rss_bytes as f64 / self.total_memory as f64 * 100.0
        } else {
            0.0
        };

        ResourceSample {
            timestamp: tick.at,
            pid,
            cpu_percent,
            memory_rss: stats.rss_bytes,
            memory_vms: stats.vms_bytes,
            memory_percent,
            threads: stats.threads,
            runtime_tasks,
        }
    }

    fn aggregate(&self, samples: &[ResourceSample], window: &Window) -> ResourceMetrics {
        let mut metrics = ResourceMetrics {
            duration: window.duration,
            sample_count: samples.len(),
            samples: samples.to_vec(),
            ..Default::default()
        };
        if samples.is_empty() {
            return metrics;
        }

        let count = samples.len() as f64;
        let mut total_cpu = 0.0;
        let mut total_rss = 0.0;
        let mut total_threads = 0.0;
        let mut total_tasks = 0.0;
        for sample in samples {
            total_cpu += sample.cpu_percent;
            total_rss += sample.memory_rss as f64;
            total_threads += sample.threads as f64;
            total_tasks += sample.runtime_tasks as f64;
            metrics.cpu_peak_percent = metrics.cpu_peak_percent.max(sample.cpu_percent);
            metrics.memory_peak_rss = metrics.memory_peak_rss.max(sample.memory_rss);
            metrics.peak_threads = metrics.peak_threads.max(sample.threads);
            metrics.peak_runtime_tasks = metrics.peak_runtime_tasks.max(sample.runtime_tasks);
        }

        metrics.cpu_avg_percent = total_cpu / count;
        metrics.memory_avg_mb = total_rss / count / MIB;
        metrics.memory_peak_mb = metrics.memory_peak_rss as f64 / MIB;
        metrics.avg_threads = total_threads / count;
        metrics.avg_runtime_tasks = total_tasks / count;
        metrics
    }
}
