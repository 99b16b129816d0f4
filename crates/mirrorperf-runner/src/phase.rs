//! One download or upload phase.
//!
//! A phase starts its monitors, runs the mirror tool once, stops every
//! monitor in a fixed order whatever the outcome, then folds the output into
//! an immutable [`PhaseMetrics`]. The resource monitor is created unstarted
//! and started from the spawn hook so it observes the child, not the harness.

use crate::classify::ExtendedMetrics;
use crate::error::{Result, RunnerError};
use crate::executor::{CommandOutput, MirrorExecutor, SpawnHook};
use crate::live::LiveStatus;
use mirrorperf_config::{RegistryAddress, Version};
use mirrorperf_monitor::format::duration_secs;
use mirrorperf_monitor::{
    DiskWriteMetrics, DiskWriteMonitor, DownloadMetrics, DownloadMonitor, RegistryMetrics,
    RegistryMonitor, ResourceMetrics, ResourceMonitor,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Which leg of an iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    /// Pull content into the local mirror directory
    #[default]
    Download,
    /// Push the local mirror to the registry
    Upload,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseKind::Download => write!(f, "download"),
            PhaseKind::Upload => write!(f, "upload"),
        }
    }
}

/// Everything measured during one phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    /// Phase these metrics describe
    pub phase: PhaseKind,
    /// Time the mirror tool ran
    #[serde(with = "duration_secs")]
    pub wall_time: Duration,
    /// Tool exit code; -1 when it never started
    pub exit_code: i32,
    /// Bytes pushed, from the logs
    pub bytes_uploaded: u64,
    /// Images skipped as already present
    pub images_skipped: u32,
    /// Cache hits
    pub cache_hits: u32,
    /// Detailed log counters
    pub extended: ExtendedMetrics,
    /// Download directory growth (download phase)
    pub download: Option<DownloadMetrics>,
    /// Mirror tool resource usage
    pub resource: Option<ResourceMetrics>,
    /// Cache directory writes (download phase, when enabled)
    pub disk: Option<DiskWriteMetrics>,
    /// Registry upload activity (upload phase)
    pub registry: Option<RegistryMetrics>,
    /// Combined tool output lines
    pub logs: Vec<String>,
}

impl PhaseMetrics {
    fn from_output(phase: PhaseKind, wall_time: Duration, output: Option<&CommandOutput>) -> Self {
        let mut metrics = Self {
            phase,
            wall_time,
            exit_code: -1,
            ..Self::default()
        };
        if let Some(output) = output {
            metrics.exit_code = output.exit_code;
            metrics.bytes_uploaded = output.extract_bytes_uploaded();
            metrics.images_skipped = output.count_skipped_images();
            metrics.cache_hits = output.count_cache_hits();
            metrics.extended = output.extract_extended_metrics();
            metrics.logs = output.logs.clone();
        }
        metrics
    }
}

/// What to run and what to watch for one phase.
#[derive(Debug, Clone)]
pub struct PhaseSpec {
    /// Download or upload
    pub kind: PhaseKind,
    /// 1-based iteration within the version group
    pub iteration: u32,
    /// Version group
    pub version: Version,
    /// Mirror tool arguments
    pub args: Vec<String>,
    /// Directory to watch for download progress
    pub download_dir: Option<PathBuf>,
    /// Directory to watch for disk writes
    pub disk_dir: Option<PathBuf>,
    /// Registry to watch for upload traffic
    pub registry: Option<RegistryAddress>,
}

impl PhaseSpec {
    /// Phase with no directory or registry monitors.
    pub fn new(kind: PhaseKind, iteration: u32, version: Version, args: Vec<String>) -> Self {
        Self {
            kind,
            iteration,
            version,
            args,
            download_dir: None,
            disk_dir: None,
            registry: None,
        }
    }

    /// Watch `dir` for download progress.
    pub fn watch_download(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    /// Watch `dir` for disk writes.
    pub fn watch_disk(mut self, dir: impl Into<PathBuf>) -> Self {
        self.disk_dir = Some(dir.into());
        self
    }

    /// Watch uploads to `registry`.
    pub fn watch_registry(mut self, registry: RegistryAddress) -> Self {
        self.registry = Some(registry);
        self
    }
}

struct PhaseMonitors {
    download: Option<DownloadMonitor>,
    resource: ResourceMonitor,
    disk: Option<DiskWriteMonitor>,
    registry: Option<RegistryMonitor>,
}

struct StoppedMonitors {
    download: Option<DownloadMetrics>,
    resource: ResourceMetrics,
    disk: Option<DiskWriteMetrics>,
    registry: Option<RegistryMetrics>,
}

fn warn_start_failure(phase: PhaseKind, monitor: &str, result: mirrorperf_monitor::Result<()>) {
    if let Err(err) = result {
        warn!(%phase, monitor, error = %err, "monitor failed to start, continuing without it");
    }
}

impl PhaseMonitors {
    async fn stop_all(self, phase: PhaseKind, live: &LiveStatus) -> StoppedMonitors {
        let download = match self.download {
            Some(monitor) => {
                let metrics = monitor.stop().await;
                debug!(%phase, monitor = "download", "monitor stopped");
                Some(metrics)
            }
            None => None,
        };

        let resource = self.resource.stop().await;
        debug!(%phase, monitor = "resource", "monitor stopped");

        let disk = match self.disk {
            Some(monitor) => {
                let metrics = monitor.stop().await;
                debug!(%phase, monitor = "disk", "monitor stopped");
                Some(metrics)
            }
            None => None,
        };

        let registry = match self.registry {
            Some(monitor) => {
                live.detach_registry();
                let metrics = monitor.stop().await;
                debug!(%phase, monitor = "registry", "monitor stopped");
                Some(metrics)
            }
            None => None,
        };

        StoppedMonitors {
            download,
            resource,
            disk,
            registry,
        }
    }
}

/// Runs single phases against one executor.
#[derive(Clone)]
pub struct PhaseRunner {
    executor: Arc<dyn MirrorExecutor>,
    poll_interval: Duration,
    stop_grace: Duration,
    live: LiveStatus,
}

impl PhaseRunner {
    /// Runner with monitors sampling every `poll_interval`.
    pub fn new(executor: Arc<dyn MirrorExecutor>, poll_interval: Duration, stop_grace: Duration) -> Self {
        Self {
            executor,
            poll_interval,
            stop_grace,
            live: LiveStatus::new(),
        }
    }

    /// Publish registry monitors and download progress through `live`.
    pub fn with_live_status(mut self, live: LiveStatus) -> Self {
        self.live = live;
        self
    }

    /// Live status handle this runner publishes to.
    pub fn live_status(&self) -> &LiveStatus {
        &self.live
    }

    fn start_monitors(&self, spec: &PhaseSpec) -> PhaseMonitors {
        let download = spec.download_dir.as_ref().map(|dir| {
            let monitor = DownloadMonitor::for_dir(dir)
                .with_poll_interval(self.poll_interval)
                .with_stop_grace(self.stop_grace);
            warn_start_failure(spec.kind, "download", monitor.start());
            if let Some(mut progress) = monitor.take_progress() {
                let live = self.live.clone();
                tokio::spawn(async move {
                    while let Some(event) = progress.recv().await {
                        live.record_progress(event);
                    }
                });
            }
            monitor
        });

        let disk = spec.disk_dir.as_ref().map(|dir| {
            let monitor = DiskWriteMonitor::for_dir(dir)
                .with_poll_interval(self.poll_interval)
                .with_stop_grace(self.stop_grace);
            warn_start_failure(spec.kind, "disk", monitor.start());
            monitor
        });

        let registry = spec.registry.as_ref().map(|address| {
            let monitor = RegistryMonitor::for_registry(address.host.clone(), address.port)
                .with_poll_interval(self.poll_interval)
                .with_stop_grace(self.stop_grace);
            warn_start_failure(spec.kind, "registry", monitor.start());
            self.live.attach_registry(monitor.clone());
            monitor
        });

        // Started from the spawn hook.
        let resource = ResourceMonitor::current_process()
            .with_poll_interval(self.poll_interval)
            .with_stop_grace(self.stop_grace);

        PhaseMonitors {
            download,
            resource,
            disk,
            registry,
        }
    }

    /// Run one phase.
    ///
    /// On failure the error is [`RunnerError::Phase`] carrying whatever was
    /// measured before the tool exited.
    pub async fn run(&self, spec: PhaseSpec) -> Result<PhaseMetrics> {
        info!(
            iteration = spec.iteration,
            version = %spec.version,
            phase = %spec.kind,
            "phase starting"
        );

        let monitors = self.start_monitors(&spec);
        let resource = monitors.resource.clone();
        let phase = spec.kind;
        let hook: SpawnHook = Box::new(move |pid| {
            warn_start_failure(phase, "resource", resource.start_for_pid(pid));
        });

        let started = Instant::now();
        let outcome = self
            .executor
            .execute_with_callback(&spec.args, Some(hook))
            .await;
        let wall_time = started.elapsed();

        let stopped = monitors.stop_all(spec.kind, &self.live).await;

        let output = match &outcome {
            Ok(output) => Some(output),
            Err(err) => err.output(),
        };
        let mut metrics = PhaseMetrics::from_output(spec.kind, wall_time, output);
        metrics.download = stopped.download;
        metrics.resource = Some(stopped.resource);
        metrics.disk = stopped.disk;
        metrics.registry = stopped.registry;

        match outcome {
            Ok(_) => {
                info!(
                    iteration = spec.iteration,
                    version = %spec.version,
                    phase = %spec.kind,
                    wall_time_ms = wall_time.as_millis() as u64,
                    images_skipped = metrics.images_skipped,
                    cache_hits = metrics.cache_hits,
                    bytes_uploaded = metrics.bytes_uploaded,
                    "phase completed"
                );
                Ok(metrics)
            }
            Err(source) => {
                warn!(
                    iteration = spec.iteration,
                    version = %spec.version,
                    phase = %spec.kind,
                    error = %source,
                    "phase failed"
                );
                Err(RunnerError::Phase {
                    iteration: spec.iteration,
                    version: spec.version,
                    phase: spec.kind,
                    source: Box::new(source),
                    partial: Box::new(metrics),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    struct WritingExecutor {
        dir: PathBuf,
        exit_code: i32,
    }

    #[async_trait]
    impl MirrorExecutor for WritingExecutor {
        async fn execute_with_callback(
            &self,
            _args: &[String],
            on_start: Option<SpawnHook>,
        ) -> Result<CommandOutput> {
            if let Some(hook) = on_start {
                hook(std::process::id());
            }
            tokio::time::sleep(Duration::from_millis(40)).await;
            std::fs::write(self.dir.join("blob"), vec![1u8; 4096])?;
            tokio::time::sleep(Duration::from_millis(40)).await;
            let output = CommandOutput::new(
                self.exit_code,
                "Using cached image foo\nuploaded 4096 bytes".into(),
                String::new(),
            );
            if self.exit_code != 0 {
                return Err(RunnerError::CommandFailed {
                    exit_code: self.exit_code,
                    output: Box::new(output),
                });
            }
            Ok(output)
        }

        async fn describe(&self, _mirror_path: &Path) -> Result<String> {
            Ok("{}".into())
        }
    }

    fn runner(dir: &Path, exit_code: i32) -> PhaseRunner {
        let executor = Arc::new(WritingExecutor {
            dir: dir.to_path_buf(),
            exit_code,
        });
        PhaseRunner::new(executor, Duration::from_millis(10), Duration::from_millis(15))
    }

    #[test]
    fn phase_kind_display() {
        assert_eq!(PhaseKind::Download.to_string(), "download");
        assert_eq!(PhaseKind::Upload.to_string(), "upload");
    }

    #[tokio::test]
    async fn download_phase_collects_monitors_and_counters() {
        let dir = TempDir::new().unwrap();
        let spec = PhaseSpec::new(PhaseKind::Download, 1, Version::V2, vec![])
            .watch_download(dir.path())
            .watch_disk(dir.path());

        let metrics = runner(dir.path(), 0).run(spec).await.unwrap();
        assert_eq!(metrics.phase, PhaseKind::Download);
        assert_eq!(metrics.exit_code, 0);
        assert_eq!(metrics.images_skipped, 1);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.bytes_uploaded, 4096);
        assert!(metrics.wall_time >= Duration::from_millis(80));
        assert_eq!(metrics.download.as_ref().map(|d| d.total_bytes_downloaded), Some(4096));
        assert!(metrics.disk.is_some());
        assert!(metrics.registry.is_none());
        let resource = metrics.resource.unwrap();
        assert!(resource.samples.iter().all(|s| s.pid == std::process::id()));
    }

    #[tokio::test]
    async fn failed_phase_keeps_partial_metrics() {
        let dir = TempDir::new().unwrap();
        let spec = PhaseSpec::new(PhaseKind::Upload, 2, Version::V1, vec![]);

        let err = runner(dir.path(), 5).run(spec).await.unwrap_err();
        assert_eq!(err.failed_phase(), Some((2, Version::V1, PhaseKind::Upload)));
        match err {
            RunnerError::Phase { partial, source, .. } => {
                assert_eq!(partial.exit_code, 5);
                assert_eq!(partial.cache_hits, 1);
                assert!(partial.resource.is_some());
                assert!(matches!(*source, RunnerError::CommandFailed { exit_code: 5, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
