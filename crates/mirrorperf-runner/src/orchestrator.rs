//! The iteration state machine.
//!
//! ```text
//! SettingUp ─▶ RunningIteration(v, 1..=N) ─┬─▶ Comparing ─▶ Saving ─▶ Done
//!                     ▲                    │
//!                     └─ CleaningWorkspace ◀┘  (between version groups)
//! ```
//!
//! Iterations never overlap, so the workspace needs no locking. The first
//! failing phase aborts the run; nothing is saved for an aborted run.

use crate::compare::{compare_clean_vs_cached, compare_versions, CleanVsCached, VersionComparison};
use crate::describe::DescribeMetrics;
use crate::error::{Result, RunnerError};
use crate::executor::{MirrorExecutor, MirrorInvocation};
use crate::live::LiveStatus;
use crate::phase::{PhaseKind, PhaseMetrics, PhaseRunner, PhaseSpec};
use crate::result::TestResult;
use crate::store::ResultStore;
use crate::workspace::Workspace;
use mirrorperf_config::{HarnessConfig, Version};
use mirrorperf_monitor::{analyze_output, NetworkMonitor, OutputMetrics};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

/// Where the orchestrator is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started
    Idle,
    /// Creating directories and configs
    SettingUp,
    /// Running one iteration of one version group
    RunningIteration {
        /// Version group
        version: Version,
        /// 1-based iteration
        iteration: u32,
    },
    /// Resetting the workspace before the next version group
    CleaningWorkspace {
        /// Group about to run
        next: Version,
    },
    /// Building comparisons
    Comparing,
    /// Writing the result file
    Saving,
    /// Finished successfully
    Done,
    /// Aborted by an error
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::SettingUp => write!(f, "setting up"),
            RunState::RunningIteration { version, iteration } => {
                write!(f, "running {} iteration {}", version, iteration)
            }
            RunState::CleaningWorkspace { next } => write!(f, "cleaning workspace for {}", next),
            RunState::Comparing => write!(f, "comparing"),
            RunState::Saving => write!(f, "saving"),
            RunState::Done => write!(f, "done"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Progress notifications for a live display.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The state machine moved
    State(RunState),
    /// An iteration finished and its result is final
    IterationCompleted(Box<TestResult>),
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Every result, version groups in run order
    pub results: Vec<TestResult>,
    /// One clean vs cached comparison per group with at least two iterations
    pub clean_vs_cached: Vec<CleanVsCached>,
    /// Present when two version groups ran
    pub version_comparison: Option<VersionComparison>,
    /// Result file written
    pub results_path: PathBuf,
}

/// Drives every iteration of one run.
pub struct Orchestrator {
    config: HarnessConfig,
    executor: Arc<dyn MirrorExecutor>,
    workspace: Workspace,
    store: ResultStore,
    phases: PhaseRunner,
    live: LiveStatus,
    state: RwLock<RunState>,
    completed: Mutex<Vec<TestResult>>,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl Orchestrator {
    /// Orchestrator for `config`, running the tool through `executor`.
    ///
    /// All paths derive from `config.workspace_root`.
    pub fn new(config: HarnessConfig, executor: Arc<dyn MirrorExecutor>) -> Self {
        let layout = config.layout();
        let live = LiveStatus::new();
        let phases = PhaseRunner::new(
            Arc::clone(&executor),
            config.poll_interval(),
            config.stop_grace(),
        )
        .with_live_status(live.clone());

        Self {
            store: ResultStore::new(layout.results_dir()),
            workspace: Workspace::new(layout),
            config,
            executor,
            phases,
            live,
            state: RwLock::new(RunState::Idle),
            completed: Mutex::new(Vec::new()),
            events: None,
        }
    }

    /// Receive [`RunEvent`]s from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<RunEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        *self.state.read()
    }

    /// Live registry and download status.
    pub fn live_status(&self) -> LiveStatus {
        self.live.clone()
    }

    /// Results of the iterations finished so far, including those of an
    /// aborted run.
    pub fn completed_results(&self) -> Vec<TestResult> {
        self.completed.lock().clone()
    }

    /// Version groups in run order.
    pub fn versions(&self) -> Vec<Version> {
        if self.config.compare_versions {
            Version::ALL.to_vec()
        } else {
            vec![Version::V2]
        }
    }

    fn transition(&self, next: RunState) {
        *self.state.write() = next;
        debug!(state = %next, "run state changed");
        self.emit(RunEvent::State(next));
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Run every iteration, compare, and save.
    pub async fn run(&self) -> Result<RunOutcome> {
        let outcome = self.run_inner().await;
        if outcome.is_err() {
            self.transition(RunState::Failed);
        }
        outcome
    }

    async fn run_inner(&self) -> Result<RunOutcome> {
        self.config.validate()?;
        self.completed.lock().clear();
        info!(config = %self.config, "starting run");

        self.transition(RunState::SettingUp);
        self.workspace
            .setup(&self.config.catalog, &self.config.packages)?;

        let mut groups: Vec<(Version, Vec<TestResult>)> = Vec::new();
        for (index, version) in self.versions().into_iter().enumerate() {
            if index > 0 {
                self.transition(RunState::CleaningWorkspace { next: version });
                self.workspace.clean_between_groups(version)?;
            }

            let mut group = Vec::new();
            for iteration in 1..=self.config.iterations {
                self.transition(RunState::RunningIteration { version, iteration });
                let result = self.run_iteration(iteration, version).await?;
                self.completed.lock().push(result.clone());
                self.emit(RunEvent::IterationCompleted(Box::new(result.clone())));
                group.push(result);
            }
            groups.push((version, group));
        }

        self.transition(RunState::Comparing);
        let clean_vs_cached: Vec<CleanVsCached> = groups
            .iter()
            .filter_map(|(_, group)| compare_clean_vs_cached(group))
            .collect();
        let version_comparison = match groups.as_slice() {
            [(first_version, first), (second_version, second)] => {
                let layout = self.workspace.layout();
                let first_dir = layout.mirror_dir(*first_version);
                let second_dir = layout.mirror_dir(*second_version);
                compare_versions(first, second, Some((first_dir.as_path(), second_dir.as_path())))
                    .await
            }
            _ => None,
        };

        self.transition(RunState::Saving);
        let results: Vec<TestResult> = groups.into_iter().flat_map(|(_, group)| group).collect();
        let results_path = self.store.save(&results)?;

        self.transition(RunState::Done);
        Ok(RunOutcome {
            results,
            clean_vs_cached,
            version_comparison,
            results_path,
        })
    }

    async fn run_iteration(&self, iteration: u32, version: Version) -> Result<TestResult> {
        let span = info_span!("iteration", iteration, version = %version);
        self.iteration_body(iteration, version).instrument(span).await
    }

    fn network_monitor(&self) -> NetworkMonitor {
        let monitor = NetworkMonitor::default_route()
            .with_poll_interval(self.config.poll_interval())
            .with_stop_grace(self.config.stop_grace());
        if let Err(err) = monitor.start() {
            warn!(error = %err, "network monitor failed to start, continuing without it");
        }
        monitor
    }

    async fn iteration_body(&self, iteration: u32, version: Version) -> Result<TestResult> {
        let layout = self.workspace.layout().clone();
        let mut result = TestResult::new(iteration, version);
        info!(run = result.run_label(), "iteration starting");

        if result.is_clean_run {
            self.workspace.clean_for_version(version)?;
        }

        let download_network = self.network_monitor();

        let mirror_dir = layout.mirror_dir(version);
        let download_args = MirrorInvocation::new(
            version,
            layout.imageset_config(version),
            format!("file://{}", mirror_dir.display()),
        )
        .cache_dir(layout.cache_dir(version))
        .lenient(true)
        .args();
        let mut download_spec = PhaseSpec::new(PhaseKind::Download, iteration, version, download_args)
            .watch_download(&mirror_dir);
        if self.config.disk_monitoring {
            download_spec = download_spec.watch_disk(layout.cache_dir(version));
        }

        result.download_phase = match self.phases.run(download_spec).await {
            Ok(metrics) => metrics,
            Err(err) => {
                download_network.stop().await;
                return Err(err);
            }
        };

        let workspace = self.workspace.clone();
        let staged = tokio::task::spawn_blocking(move || workspace.stage_upload(version))
            .await
            .map_err(RunnerError::from)
            .and_then(|staged| staged);
        if let Err(source) = staged {
            download_network.stop().await;
            return Err(RunnerError::Phase {
                iteration,
                version,
                phase: PhaseKind::Upload,
                source: Box::new(source),
                partial: Box::new(PhaseMetrics {
                    phase: PhaseKind::Upload,
                    exit_code: -1,
                    ..PhaseMetrics::default()
                }),
            });
        }

        // The host interface stays observed across the phase boundary.
        let upload_network = self.network_monitor();
        let download_net = download_network.stop().await;

        let upload_args = MirrorInvocation::new(
            version,
            layout.platform_config(version),
            self.config.normalized_registry_url(),
        )
        .from_source(format!("file://{}", layout.platform_mirror().display()))
        .skip_tls(self.config.skip_tls)
        .args();
        let upload_spec = PhaseSpec::new(PhaseKind::Upload, iteration, version, upload_args)
            .watch_registry(self.config.registry_address());

        result.upload_phase = match self.phases.run(upload_spec).await {
            Ok(metrics) => metrics,
            Err(err) => {
                upload_network.stop().await;
                return Err(err);
            }
        };
        let upload_net = upload_network.stop().await;
        result.network_metrics = download_net.combine(&upload_net);

        result.output_metrics = self.analyze_mirror(mirror_dir.clone()).await;
        if self.config.describe {
            result.describe_metrics = self.describe_mirror(&mirror_dir).await;
        }

        result.generate_summary();
        info!(summary = %result.summary, "iteration completed");
        Ok(result)
    }

    async fn analyze_mirror(&self, dir: PathBuf) -> Option<OutputMetrics> {
        match tokio::task::spawn_blocking(move || analyze_output(&dir)).await {
            Ok(Ok(metrics)) => Some(metrics),
            Ok(Err(err)) => {
                warn!(error = %err, "output analysis failed");
                None
            }
            Err(err) => {
                warn!(error = %err, "output analysis task failed");
                None
            }
        }
    }

    async fn describe_mirror(&self, dir: &std::path::Path) -> Option<DescribeMetrics> {
        let parsed = match self.executor.describe(dir).await {
            Ok(raw) => DescribeMetrics::parse(&raw),
            Err(err) => Err(err),
        };
        match parsed {
            Ok(metrics) => Some(metrics),
            Err(err) => {
                warn!(error = %err, "describe unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display() {
        assert_eq!(
            RunState::RunningIteration {
                version: Version::V1,
                iteration: 2
            }
            .to_string(),
            "running v1 iteration 2"
        );
        assert_eq!(
            RunState::CleaningWorkspace { next: Version::V2 }.to_string(),
            "cleaning workspace for v2"
        );
    }
}
