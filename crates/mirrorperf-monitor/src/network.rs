//! Host interface bandwidth.

use crate::format::{duration_secs, format_bytes_human};
use crate::session::{DoubleStart, PollingSession, Sampler, Tick, Window};
use crate::sources::net::{self, InterfaceCounters};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Bandwidth monitor over one network interface.
pub type NetworkMonitor = PollingSession<NetworkSampler>;

impl PollingSession<NetworkSampler> {
    /// Monitor the interface carrying the default route.
    pub fn default_route() -> Self {
        Self::new(NetworkSampler::new(net::default_interface()))
    }

    /// Monitor a named interface.
    pub fn on_interface(interface: impl Into<String>) -> Self {
        Self::new(NetworkSampler::new(interface.into()))
    }
}

/// Interface counters at one tick plus the rates since the previous tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSample {
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
    /// Cumulative received bytes
    pub rx_bytes: u64,
    /// Cumulative transmitted bytes
    pub tx_bytes: u64,
    /// Receive rate in Mbps
    pub rx_rate_mbps: f64,
    /// Transmit rate in Mbps
    pub tx_rate_mbps: f64,
}

/// Aggregate bandwidth over a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    /// Interface observed
    pub interface: String,
    /// Session wall time
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// When sampling began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When sampling ended, or the snapshot time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Mean combined rx+tx rate over active samples
    pub average_bandwidth_mbps: f64,
    /// Highest combined rx+tx rate
    pub peak_bandwidth_mbps: f64,
    /// Mean receive rate over active samples
    pub average_rx_rate_mbps: f64,
    /// Mean transmit rate over active samples
    pub average_tx_rate_mbps: f64,
    /// rx+tx bytes moved since the session started
    pub total_bytes_transferred: u64,
    /// Number of samples folded in
    pub sample_count: usize,
    /// Raw samples
    pub samples: Vec<BandwidthSample>,
}

impl NetworkMetrics {
    /// Merge the metrics of two overlapping sessions on the same host.
    ///
    /// Totals add, the peak is the larger peak and averages are averaged.
    /// The duration spans the earliest start to the latest end, so the
    /// overlap is counted once.
    pub fn combine(&self, other: &NetworkMetrics) -> NetworkMetrics {
        let started_at = earliest(self.started_at, other.started_at);
        let ended_at = match (self.ended_at, other.ended_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let both_stamped = self.started_at.is_some()
            && self.ended_at.is_some()
            && other.started_at.is_some()
            && other.ended_at.is_some();
        let duration = match (started_at, ended_at) {
            (Some(start), Some(end)) if both_stamped => (end - start).to_std().unwrap_or_default(),
            _ => self.duration.max(other.duration),
        };

        NetworkMetrics {
            interface: if self.interface.is_empty() {
                other.interface.clone()
            } else {
                self.interface.clone()
            },
            duration,
            started_at,
            ended_at,
            average_bandwidth_mbps: (self.average_bandwidth_mbps + other.average_bandwidth_mbps) / 2.0,
            peak_bandwidth_mbps: self.peak_bandwidth_mbps.max(other.peak_bandwidth_mbps),
            average_rx_rate_mbps: (self.average_rx_rate_mbps + other.average_rx_rate_mbps) / 2.0,
            average_tx_rate_mbps: (self.average_tx_rate_mbps + other.average_tx_rate_mbps) / 2.0,
            total_bytes_transferred: self.total_bytes_transferred + other.total_bytes_transferred,
            sample_count: self.sample_count + other.sample_count,
            samples: self
                .samples
                .iter()
                .chain(other.samples.iter())
                .cloned()
                .collect(),
        }
    }

    /// Average over peak, zero without a peak.
    pub fn efficiency(&self) -> f64 {
        if self.peak_bandwidth_mbps > 0.0 {
            self.average_bandwidth_mbps / self.peak_bandwidth_mbps
        } else {
            0.0
        }
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        format!(
            "Avg: {:.2} Mbps | Peak: {:.2} Mbps | Total: {}",
            self.average_bandwidth_mbps,
            self.peak_bandwidth_mbps,
            format_bytes_human(self.total_bytes_transferred)
        )
    }
}

/// Reads interface counters and converts deltas to Mbps.
pub struct NetworkSampler {
    interface: String,
    baseline: InterfaceCounters,
    previous: Option<(InterfaceCounters, Instant)>,
}

impl NetworkSampler {
    /// Sampler for `interface`.
    pub fn new(interface: String) -> Self {
        Self {
            interface,
            baseline: InterfaceCounters::default(),
            previous: None,
        }
    }

    /// Interface being read.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn transferred_since_baseline(&self, counters: InterfaceCounters) -> u64 {
        counters.rx_bytes.saturating_sub(self.baseline.rx_bytes)
            + counters.tx_bytes.saturating_sub(self.baseline.tx_bytes)
    }
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn mbps(delta: u64, elapsed: f64) -> f64 {
    if elapsed > 0.0 {
        delta as f64 * 8.0 / elapsed / 1_000_000.0
    } else {
        0.0
    }
}

impl Sampler for NetworkSampler {
    type Sample = BandwidthSample;
    type Metrics = NetworkMetrics;
    const KIND: &'static str = "network";
    const DOUBLE_START: DoubleStart = DoubleStart::Reject;

    fn begin(&mut self, _tick: &Tick) {
        self.baseline = net::read_counters(&self.interface);
        self.previous = Some((self.baseline, Instant::now()));
    }

    fn sample(&mut self, tick: &Tick) -> BandwidthSample {
        let counters = net::read_counters(&self.interface);
        let now = Instant::now();
        let (rx_rate_mbps, tx_rate_mbps) = match self.previous {
            Some((prev, at)) => {
                let elapsed = now.saturating_duration_since(at).as_secs_f64();
                (
                    mbps(counters.rx_bytes.saturating_sub(prev.rx_bytes), elapsed),
                    mbps(counters.tx_bytes.saturating_sub(prev.tx_bytes), elapsed),
                )
            }
            None => (0.0, 0.0),
        };
        self.previous = Some((counters, now));

        BandwidthSample {
            timestamp: tick.at,
            rx_bytes: counters.rx_bytes,
            tx_bytes: counters.tx_bytes,
            rx_rate_mbps,
            tx_rate_mbps,
        }
    }

    fn aggregate(&self, samples: &[BandwidthSample], window: &Window) -> NetworkMetrics {
        let mut metrics = NetworkMetrics {
            interface: self.interface.clone(),
            duration: window.duration,
            started_at: Some(window.started_at),
            ended_at: Some(window.ended_at),
            sample_count: samples.len(),
            samples: samples.to_vec(),
            ..Default::default()
        };

        let last = match samples.last() {
            Some(last) => InterfaceCounters {
                rx_bytes: last.rx_bytes,
                tx_bytes: last.tx_bytes,
            },
            None => net::read_counters(&self.interface),
        };
        metrics.total_bytes_transferred = self.transferred_since_baseline(last);

        let active: Vec<&BandwidthSample> = samples
            .iter()
            .filter(|s| s.rx_rate_mbps > 0.0 || s.tx_rate_mbps > 0.0)
            .collect();
        if !active.is_empty() {
            let count = active.len() as f64;
            metrics.average_rx_rate_mbps = active.iter().map(|s| s.rx_rate_mbps).sum::<f64>() / count;
            metrics.average_tx_rate_mbps = active.iter().map(|s| s.tx_rate_mbps).sum::<f64>() / count;
            metrics.average_bandwidth_mbps = metrics.average_rx_rate_mbps + metrics.average_tx_rate_mbps;
            metrics.peak_bandwidth_mbps = active
                .iter()
                .map(|s| s.rx_rate_mbps + s.tx_rate_mbps)
                .fold(0.0, f64::max);
        } else if window.duration.as_secs_f64() > 0.0 {
            metrics.average_bandwidth_mbps =
                mbps(metrics.total_bytes_transferred, window.duration.as_secs_f64());
        }
        metrics
    }
}
