//! End-to-end orchestrator runs against a scripted mirror tool.

use async_trait::async_trait;
use mirrorperf_config::{HarnessConfig, Version};
use mirrorperf_runner::{
    CommandOutput, MirrorExecutor, Orchestrator, PhaseKind, ResultStore, RunEvent, RunState,
    RunnerError, SpawnHook,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing_test::traced_test;

const DESCRIBE_JSON: &str = r#"{
  "pastMirror": {
    "operators": [{"catalog": "registry.redhat.io/redhat/redhat-operator-index:v4.18", "packages": [{"name": "web-terminal"}]}],
    "associations": [{"name": "web-terminal", "layerDigests": ["sha256:l1", "sha256:l2"], "manifestDigests": ["sha256:m1"]}]
  }
}"#;

/// Stands in for oc-mirror: writes a blob per download, reports one more
/// cache hit on every download call, and can fail a chosen upload.
#[derive(Default)]
struct ScriptedExecutor {
    downloads: AtomicU32,
    uploads: AtomicU32,
    fail_upload: Option<u32>,
}

impl ScriptedExecutor {
    fn failing_upload(call: u32) -> Self {
        Self {
            fail_upload: Some(call),
            ..Self::default()
        }
    }
}

fn file_destination(args: &[String]) -> Option<PathBuf> {
    args.last()
        .and_then(|dest| dest.strip_prefix("file://"))
        .map(PathBuf::from)
}

#[async_trait]
impl MirrorExecutor for ScriptedExecutor {
    async fn execute_with_callback(
        &self,
        args: &[String],
        on_start: Option<SpawnHook>,
    ) -> mirrorperf_runner::Result<CommandOutput> {
        if let Some(hook) = on_start {
            hook(std::process::id());
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        let is_upload = args.iter().any(|arg| arg == "--from");
        if is_upload {
            let call = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
            let stdout = "info: pushed layer size: 4096 bytes".to_string();
            if self.fail_upload == Some(call) {
                let output = CommandOutput::new(1, stdout, "error: registry unreachable".into());
                return Err(RunnerError::CommandFailed {
                    exit_code: 1,
                    output: Box::new(output),
                });
            }
            return Ok(CommandOutput::new(0, stdout, String::new()));
        }

        let call = self.downloads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(dest) = file_destination(args) {
            let blobs = dest.join("blobs").join("sha256");
            std::fs::create_dir_all(&blobs)?;
            std::fs::write(blobs.join("layer"), vec![7u8; 2048])?;
            std::fs::write(dest.join("manifest.json"), "{}")?;
        }
        let stdout = (0..call)
            .map(|_| "info: cache hit for image".to_string())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(CommandOutput::new(0, stdout, String::new()))
    }

    async fn describe(&self, _mirror_path: &Path) -> mirrorperf_runner::Result<String> {
        Ok(DESCRIBE_JSON.to_string())
    }
}

fn config(root: &Path, iterations: u32, compare_versions: bool) -> HarnessConfig {
    HarnessConfig {
        registry_url: "127.0.0.1:5000".into(),
        iterations,
        compare_versions,
        workspace_root: root.to_path_buf(),
        poll_interval_ms: 10,
        stop_grace_ms: 10,
        ..HarnessConfig::default()
    }
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn first_iteration_is_clean_and_the_rest_are_cached() {
    let root = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::new(
        config(root.path(), 3, false),
        Arc::new(ScriptedExecutor::default()),
    );
    let mut rx = orchestrator.subscribe();

    let outcome = orchestrator.run().await.unwrap();

    let clean: Vec<bool> = outcome.results.iter().map(|r| r.is_clean_run).collect();
    assert_eq!(clean, vec![true, false, false]);
    assert!(outcome.results.iter().all(|r| r.version == Version::V2));
    assert!(outcome.results[0].summary.starts_with("Iteration 1 (CLEAN, v2)"));
    assert!(outcome.results[1].summary.starts_with("Iteration 2 (CACHED, v2)"));

    let first = &outcome.results[0];
    assert_eq!(first.upload_phase.bytes_uploaded, 4096);
    assert!(first.download_phase.resource.is_some());
    assert!(first.download_phase.disk.is_some());
    assert!(first.upload_phase.registry.is_some());
    assert!(first.output_metrics.as_ref().unwrap().total_files >= 2);
    assert_eq!(first.describe_metrics.as_ref().unwrap().total_layers, 2);

    assert_eq!(outcome.clean_vs_cached.len(), 1);
    let cvc = &outcome.clean_vs_cached[0];
    assert_eq!(cvc.cached_runs, 2);
    assert_eq!(cvc.cache_hits.baseline, 1.0);
    assert_eq!(cvc.cache_hits.candidate, 2.5);
    assert!(outcome.version_comparison.is_none());

    let saved = ResultStore::load(&outcome.results_path).unwrap();
    let summaries: Vec<&str> = saved.iter().map(|r| r.summary.as_str()).collect();
    let expected: Vec<&str> = outcome.results.iter().map(|r| r.summary.as_str()).collect();
    assert_eq!(summaries, expected);
    assert_eq!(orchestrator.state(), RunState::Done);

    let completed = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, RunEvent::IterationCompleted(_)))
        .count();
    assert_eq!(completed, 3);
}

#[tokio::test]
async fn compare_mode_cleans_once_between_version_groups() {
    let root = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::new(
        config(root.path(), 2, true),
        Arc::new(ScriptedExecutor::default()),
    );
    let mut rx = orchestrator.subscribe();

    let outcome = orchestrator.run().await.unwrap();

    let order: Vec<(Version, u32)> = outcome
        .results
        .iter()
        .map(|r| (r.version, r.iteration))
        .collect();
    assert_eq!(
        order,
        vec![(Version::V1, 1), (Version::V1, 2), (Version::V2, 1), (Version::V2, 2)]
    );

    let states: Vec<RunState> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            RunEvent::State(state) => Some(state),
            RunEvent::IterationCompleted(_) => None,
        })
        .collect();
    let cleanings: Vec<usize> = states
        .iter()
        .enumerate()
        .filter(|(_, s)| matches!(s, RunState::CleaningWorkspace { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(cleanings.len(), 1);
    let at = cleanings[0];
    assert_eq!(
        states[at - 1],
        RunState::RunningIteration {
            version: Version::V1,
            iteration: 2
        }
    );
    assert_eq!(
        states[at + 1],
        RunState::RunningIteration {
            version: Version::V2,
            iteration: 1
        }
    );

    assert_eq!(outcome.clean_vs_cached.len(), 2);
    let comparison = outcome.version_comparison.as_ref().unwrap();
    assert_eq!(comparison.baseline_version, Version::V1);
    assert_eq!(comparison.candidate_version, Version::V2);
    let hits = comparison.metric("Cache hits").unwrap();
    assert_eq!(hits.baseline, 1.0);
    assert_eq!(hits.candidate, 3.0);
    assert!(comparison.content.as_ref().unwrap().matches);
}

#[tokio::test]
#[traced_test]
async fn failed_upload_aborts_without_saving() {
    let root = TempDir::new().unwrap();
    let config = config(root.path(), 3, false);
    let results_dir = config.layout().results_dir();
    let orchestrator = Orchestrator::new(config, Arc::new(ScriptedExecutor::failing_upload(2)));

    let err = orchestrator.run().await.unwrap_err();

    assert_eq!(err.failed_phase(), Some((2, Version::V2, PhaseKind::Upload)));
    assert_eq!(err.output().unwrap().exit_code, 1);
    match &err {
        RunnerError::Phase { partial, .. } => {
            assert_eq!(partial.exit_code, 1);
            assert!(partial.registry.is_some());
        }
        other => panic!("expected a phase error, got {other:?}"),
    }
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert_eq!(orchestrator.completed_results().len(), 1);
    assert!(ResultStore::new(results_dir).list().unwrap().is_empty());

    // Five phase monitors per iteration, each stopped once.
    logs_assert(|lines: &[&str]| {
        let phase_stops = lines
            .iter()
            .filter(|l| l.contains("monitor stopped") && l.contains("phase="))
            .count();
        let network_stops = lines
            .iter()
            .filter(|l| l.contains("monitor stopped") && l.contains("monitor=\"network\""))
            .count();
        match (phase_stops, network_stops) {
            (10, 4) => Ok(()),
            other => Err(format!("unexpected (phase, network) stop counts: {other:?}")),
        }
    });
}
