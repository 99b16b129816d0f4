//! Running the mirror tool.
//!
//! [`MirrorExecutor`] is the seam between the orchestrator and the external
//! process. [`OcMirrorExecutor`] is the real implementation; tests provide
//! scripted ones.
//!
//! The spawn hook passed to [`MirrorExecutor::execute_with_callback`] runs on
//! the calling task right after the child is spawned and before its output
//! is read, so it can retarget a resource monitor at the child's pid. The
//! child may not have written anything yet when the hook runs.

use crate::error::{Result, RunnerError};
use async_trait::async_trait;
use mirrorperf_config::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Callback receiving the child pid right after spawn.
pub type SpawnHook = Box<dyn FnOnce(u32) + Send>;

/// Everything captured from one run of the tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code; -1 when the process never started or was killed by a signal
    pub exit_code: i32,
    /// Raw stdout
    pub stdout: String,
    /// Raw stderr
    pub stderr: String,
    /// stdout and stderr joined by a newline, split into lines
    pub logs: Vec<String>,
}

impl CommandOutput {
    /// Build from raw streams, deriving `logs`.
    pub fn new(exit_code: i32, stdout: String, stderr: String) -> Self {
        let logs = format!("{}\n{}", stdout, stderr)
            .split('\n')
            .map(str::to_string)
            .collect();
        Self {
            exit_code,
            stdout,
            stderr,
            logs,
        }
    }

    /// Output for a process that could not be spawned.
    pub fn spawn_failure(error: &str) -> Self {
        Self::new(-1, String::new(), error.to_string())
    }

    /// Whether the tool exited zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Argument vector for one oc-mirror invocation.
///
/// Version-specific flags are dropped for the version that does not accept
/// them, so callers can set everything unconditionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorInvocation {
    version: Version,
    config: PathBuf,
    destination: String,
    from: Option<String>,
    cache_dir: Option<PathBuf>,
    lenient: bool,
    skip_tls: bool,
}

impl MirrorInvocation {
    /// Invocation with a config file and a destination.
    pub fn new(version: Version, config: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            version,
            config: config.into(),
            destination: destination.into(),
            from: None,
            cache_dir: None,
            lenient: false,
            skip_tls: false,
        }
    }

    /// Mirror from a local source (`--from`).
    pub fn from_source(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Cache directory (`--cache-dir`, v2 only).
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Skip missing packages and keep going on errors (v1 only).
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// Disable destination TLS verification.
    pub fn skip_tls(mut self, skip: bool) -> Self {
        self.skip_tls = skip;
        self
    }

    /// Render the argument vector; the destination is always last.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.version == Version::V2 {
            args.push("--v2".to_string());
        }
        if self.version.supports_cache_dir() {
            if let Some(dir) = &self.cache_dir {
                args.push("--cache-dir".to_string());
                args.push(dir.display().to_string());
            }
        }
        if self.version.supports_lenient_flags() && self.lenient {
            args.push("--skip-missing".to_string());
            args.push("--continue-on-error".to_string());
        }
        args.push(self.version.config_flag().to_string());
        args.push(self.config.display().to_string());
        if let Some(from) = &self.from {
            args.push("--from".to_string());
            args.push(from.clone());
        }
        if self.skip_tls {
            args.push(self.version.skip_tls_flag().to_string());
        }
        args.push(self.destination.clone());
        args
    }
}

/// Runs the mirror tool.
#[async_trait]
pub trait MirrorExecutor: Send + Sync {
    /// Run with `args`, calling `on_start` with the child pid once spawned.
    ///
    /// A non-zero exit is an error that still carries the captured output.
    async fn execute_with_callback(
        &self,
        args: &[String],
        on_start: Option<SpawnHook>,
    ) -> Result<CommandOutput>;

    /// Run with `args`.
    async fn execute(&self, args: &[String]) -> Result<CommandOutput> {
        self.execute_with_callback(args, None).await
    }

    /// Raw `describe` output for a mirror directory.
    async fn describe(&self, mirror_path: &Path) -> Result<String>;
}

/// Executes the real `oc-mirror` binary.
#[derive(Debug, Clone)]
pub struct OcMirrorExecutor {
    binary: String,
    working_dir: Option<PathBuf>,
}

impl OcMirrorExecutor {
    /// Executor for `binary`, resolved through `PATH` when not a path.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            working_dir: None,
        }
    }

    /// Run the tool from `dir`.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Binary being executed.
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Directory the tool runs from, if any.
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl Default for OcMirrorExecutor {
    fn default() -> Self {
        Self::new("oc-mirror")
    }
}

#[async_trait]
impl MirrorExecutor for OcMirrorExecutor {
    async fn execute_with_callback(
        &self,
        args: &[String],
        on_start: Option<SpawnHook>,
    ) -> Result<CommandOutput> {
        info!(binary = %self.binary, args = %args.join(" "), "executing mirror command");

        let child = match self.command(args).spawn() {
            Ok(child) => child,
            Err(err) => {
                return Err(RunnerError::Spawn {
                    program: self.binary.clone(),
                    output: Box::new(CommandOutput::spawn_failure(&err.to_string())),
                })
            }
        };

        if let (Some(hook), Some(pid)) = (on_start, child.id()) {
            debug!(pid, "mirror command spawned");
            hook(pid);
        }

        let raw = child.wait_with_output().await?;
        let output = CommandOutput::new(
            raw.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&raw.stdout).into_owned(),
            String::from_utf8_lossy(&raw.stderr).into_owned(),
        );

        if !raw.status.success() {
            return Err(RunnerError::CommandFailed {
                exit_code: output.exit_code,
                output: Box::new(output),
            });
        }
        Ok(output)
    }

    async fn describe(&self, mirror_path: &Path) -> Result<String> {
        let args = vec!["describe".to_string(), mirror_path.display().to_string()];
        match self.execute(&args).await {
            Ok(output) => Ok(output.stdout),
            Err(err) => Err(RunnerError::Describe(match err.output() {
                Some(output) => output.stderr.trim().to_string(),
                None => err.to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn v2_download_args() {
        let args = MirrorInvocation::new(Version::V2, "/ws/cfg-v2.yaml", "file:///ws/mirror")
            .cache_dir("/ws/operators-v2")
            .lenient(true)
            .args();
        assert_eq!(
            args,
            vec![
                "--v2",
                "--cache-dir",
                "/ws/operators-v2",
                "-c",
                "/ws/cfg-v2.yaml",
                "file:///ws/mirror"
            ]
        );
    }

    #[test]
    fn v1_upload_args() {
        let args = MirrorInvocation::new(Version::V1, "platform-v1.yaml", "docker://reg:5000")
            .cache_dir("ignored")
            .from_source("file:///ws/platform/mirror")
            .skip_tls(true)
            .args();
        assert_eq!(
            args,
            vec![
                "--config",
                "platform-v1.yaml",
                "--from",
                "file:///ws/platform/mirror",
                "--dest-skip-tls=true",
                "docker://reg:5000"
            ]
        );
    }

    #[test]
    fn v1_lenient_and_v2_tls_flags() {
        let v1 = MirrorInvocation::new(Version::V1, "c", "d").lenient(true).args();
        assert!(v1.contains(&"--skip-missing".to_string()));
        assert!(v1.contains(&"--continue-on-error".to_string()));

        let v2 = MirrorInvocation::new(Version::V2, "c", "d").skip_tls(true).args();
        assert!(v2.contains(&"--dest-tls-verify=false".to_string()));
        assert_eq!(v2.last().map(String::as_str), Some("d"));
    }

    #[test]
    fn logs_combine_both_streams() {
        let output = CommandOutput::new(0, "a\nb".into(), "c".into());
        assert_eq!(output.logs, vec!["a", "b", "c"]);
        assert!(output.success());
    }

    #[tokio::test]
    async fn spawn_failure_carries_output() {
        let executor = OcMirrorExecutor::new("/definitely/not/a/binary");
        let err = executor.execute(&[]).await.unwrap_err();
        let output = err.output().expect("spawn failure carries output");
        assert_eq!(output.exit_code, -1);
        assert!(!output.stderr.is_empty());
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hook_receives_child_pid_and_failure_keeps_output() {
        let executor = OcMirrorExecutor::new("sh");
        let seen = Arc::new(Mutex::new(None));
        let hook_seen = Arc::clone(&seen);
        let args = vec!["-c".to_string(), "echo pulled 3 images; echo oops >&2; exit 3".to_string()];

        let err = executor
            .execute_with_callback(
                &args,
                Some(Box::new(move |pid| {
                    *hook_seen.lock().unwrap() = Some(pid);
                })),
            )
            .await
            .unwrap_err();

        assert!(seen.lock().unwrap().is_some());
        match err {
            RunnerError::CommandFailed { exit_code, output } => {
                assert_eq!(exit_code, 3);
                assert!(output.stdout.contains("pulled 3 images"));
                assert!(output.logs.iter().any(|l| l == "oops"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
