//! Upload throughput towards a registry.

use crate::format::{duration_secs, format_bytes_human, rate_mbs};
use crate::session::{DoubleStart, PollingSession, Sampler, Tick, Window};
use crate::sources::{connections, net};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Registry upload monitor.
pub type RegistryMonitor = PollingSession<RegistrySampler>;

impl PollingSession<RegistrySampler> {
    /// Monitor uploads to `host:port` over the default-route interface.
    pub fn for_registry(host: impl Into<String>, port: u16) -> Self {
        Self::new(RegistrySampler::new(host.into(), port, net::default_interface()))
    }
}

/// Transmit counter and connection count at one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySample {
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
    /// Bytes sent since start
    pub total_tx_bytes: u64,
    /// Bytes sent since the previous tick
    pub bytes_delta: u64,
    /// MiB/s since the previous tick
    pub upload_rate_mbs: f64,
    /// Established connections to the registry
    pub connections: u32,
}

/// Aggregate upload activity over a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryMetrics {
    /// Registry endpoint observed, `host:port`
    pub endpoint: String,
    /// Bytes sent since start
    pub total_bytes_uploaded: u64,
    /// Session wall time, or time so far for a snapshot
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Mean upload rate
    pub average_upload_rate_mbs: f64,
    /// Highest upload rate
    pub peak_upload_rate_mbs: f64,
    /// Lowest positive upload rate
    pub min_upload_rate_mbs: f64,
    /// Connections seen at the latest tick
    pub connection_count: u32,
    /// Raw samples
    pub samples: Vec<RegistrySample>,
    /// Session start
    pub start_time: DateTime<Utc>,
    /// Session end, or "now" for a snapshot
    pub end_time: DateTime<Utc>,
}

impl RegistryMetrics {
    /// One-line summary.
    pub fn summary(&self) -> String {
        format!(
            "Uploaded: {} | Avg: {:.2} MB/s | Peak: {:.2} MB/s | Connections: {}",
            format_bytes_human(self.total_bytes_uploaded),
            self.average_upload_rate_mbs,
            self.peak_upload_rate_mbs,
            self.connection_count
        )
    }
}

/// Reads the interface transmit counter and the registry's connection table.
pub struct RegistrySampler {
    host: String,
    port: u16,
    interface: String,
    initial_tx: u64,
    previous: Option<(u64, Instant)>,
}

impl RegistrySampler {
    /// Sampler for `host:port`, reading counters of `interface`.
    pub fn new(host: String, port: u16, interface: String) -> Self {
        Self {
            host,
            port,
            interface,
            initial_tx: 0,
            previous: None,
        }
    }

    /// `host:port` being observed.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Sampler for RegistrySampler {
    type Sample = RegistrySample;
    type Metrics = RegistryMetrics;
    const KIND: &'static str = "registry";
    const DOUBLE_START: DoubleStart = DoubleStart::Reject;

    fn begin(&mut self, _tick: &Tick) {
        self.initial_tx = net::read_counters(&self.interface).tx_bytes;
        self.previous = Some((self.initial_tx, Instant::now()));
    }

    fn sample(&mut self, tick: &Tick) -> RegistrySample {
        let tx = net::read_counters(&self.interface).tx_bytes;
        let connections = connections::count_established(&self.host, self.port);
        let now = Instant::now();
        let (last_tx, last_at) = self.previous.unwrap_or((self.initial_tx, now));
        let bytes_delta = tx.saturating_sub(last_tx);
        self.previous = Some((tx, now));

        RegistrySample {
            timestamp: tick.at,
            total_tx_bytes: tx.saturating_sub(self.initial_tx),
            bytes_delta,
            upload_rate_mbs: rate_mbs(bytes_delta as f64, now.saturating_duration_since(last_at)),
            connections,
        }
    }

    fn aggregate(&self, samples: &[RegistrySample], window: &Window) -> RegistryMetrics {
        let mut metrics = RegistryMetrics {
            endpoint: self.endpoint(),
            duration: window.duration,
            samples: samples.to_vec(),
            start_time: window.started_at,
            end_time: window.ended_at,
            ..Default::default()
        };
        let Some(last) = samples.last() else {
            let tx = net::read_counters(&self.interface).tx_bytes;
            metrics.total_bytes_uploaded = tx.saturating_sub(self.initial_tx);
            metrics.average_upload_rate_mbs =
                rate_mbs(metrics.total_bytes_uploaded as f64, window.duration);
            return metrics;
        };
        metrics.total_bytes_uploaded = last.total_tx_bytes;
        metrics.connection_count = last.connections;

        let rates: Vec<f64> = samples.iter().map(|s| s.upload_rate_mbs).collect();
        metrics.average_upload_rate_mbs = rates.iter().sum::<f64>() / rates.len() as f64;
        metrics.peak_upload_rate_mbs = rates.iter().copied().fold(0.0, f64::max);
        metrics.min_upload_rate_mbs = rates
            .iter()
            .copied()
            .filter(|rate| *rate > 0.0)
            .reduce(f64::min)
            .unwrap_or(0.0);
        if metrics.average_upload_rate_mbs == 0.0 {
            metrics.average_upload_rate_mbs =
                rate_mbs(metrics.total_bytes_uploaded as f64, window.duration);
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler() -> RegistrySampler {
        RegistrySampler::new("localhost".into(), 5000, "lo".into())
    }

    fn sample(total: u64, rate: f64, conns: u32) -> RegistrySample {
        RegistrySample {
            total_tx_bytes: total,
            upload_rate_mbs: rate,
            connections: conns,
            ..Default::default()
        }
    }

    #[test]
    fn aggregate_uses_last_sample_totals() {
        let now = Utc::now();
        let window = Window {
            started_at: now,
            ended_at: now,
            duration: Duration::from_secs(3),
            complete: true,
        };
        let metrics = sampler().aggregate(
            &[sample(100, 0.0, 1), sample(300, 3.0, 4), sample(900, 6.0, 2)],
            &window,
        );
        assert_eq!(metrics.endpoint, "localhost:5000");
        assert_eq!(metrics.total_bytes_uploaded, 900);
        assert_eq!(metrics.connection_count, 2);
        assert_eq!(metrics.average_upload_rate_mbs, 3.0);
        assert_eq!(metrics.peak_upload_rate_mbs, 6.0);
        assert_eq!(metrics.min_upload_rate_mbs, 3.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn empty_session_falls_back_to_counter_delta() {
        use std::io::{Read, Write};
        use std::net::{TcpListener, TcpStream};

        const PAYLOAD: usize = 1024 * 1024;

        let mut sampler = sampler();
        let now = Utc::now();
        sampler.begin(&Tick {
            at: now,
            pid: None,
            since_start: Duration::ZERO,
        });

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let reader = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut sink = Vec::new();
            conn.read_to_end(&mut sink).unwrap();
            sink.len()
        });
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(&vec![1u8; PAYLOAD]).unwrap();
        drop(client);
        assert_eq!(reader.join().unwrap(), PAYLOAD);

        let metrics = sampler.aggregate(
            &[],
            &Window {
                started_at: now,
                ended_at: now,
                duration: Duration::from_secs(2),
                complete: true,
            },
        );
        assert!(metrics.samples.is_empty());
        assert!(metrics.total_bytes_uploaded >= PAYLOAD as u64);
        assert_eq!(
            metrics.average_upload_rate_mbs,
            rate_mbs(metrics.total_bytes_uploaded as f64, Duration::from_secs(2))
        );
        assert_eq!(metrics.peak_upload_rate_mbs, 0.0);
    }

    #[tokio::test]
    async fn snapshot_while_running_then_stop() {
        let monitor = RegistryMonitor::new(sampler())
            .with_poll_interval(Duration::from_millis(20))
            .with_stop_grace(Duration::from_millis(10));
        monitor.start().unwrap();
        assert!(monitor.start().is_err());
        tokio::time::sleep(Duration::from_millis(70)).await;

        let snap = monitor
            .snapshot()
            .await
            .expect("running monitor has a snapshot");
        assert!(!snap.samples.is_empty());
        let done = monitor.stop().await;
        assert!(done.samples.len() >= snap.samples.len());
        assert!(done.end_time >= done.start_time);
    }
}
