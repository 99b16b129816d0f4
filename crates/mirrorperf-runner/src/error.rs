//! Error types for running the harness.

use crate::executor::CommandOutput;
use crate::phase::{PhaseKind, PhaseMetrics};
use mirrorperf_config::{ConfigError, Version};
use mirrorperf_monitor::MonitorError;
use std::path::PathBuf;
use thiserror::Error;

/// Harness errors.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Workspace directory or generated config could not be created
    #[error("workspace setup failed at {path}: {source}")]
    Setup {
        /// Path being created
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The mirror tool could not be started
    #[error("failed to start {program}: {}", output.stderr)]
    Spawn {
        /// Program that failed to spawn
        program: String,
        /// Output with exit code -1 and the spawn error in stderr
        output: Box<CommandOutput>,
    },

    /// The mirror tool exited non-zero
    #[error("mirror command exited with code {exit_code}")]
    CommandFailed {
        /// Process exit code
        exit_code: i32,
        /// Everything captured before it exited
        output: Box<CommandOutput>,
    },

    /// A phase failed; the run stops here
    #[error("iteration {iteration} ({version}) {phase} phase failed: {source}")]
    Phase {
        /// 1-based iteration within the version group
        iteration: u32,
        /// Version group
        version: Version,
        /// Failing phase
        phase: PhaseKind,
        /// What went wrong
        #[source]
        source: Box<RunnerError>,
        /// Metrics collected before the failure
        partial: Box<PhaseMetrics>,
    },

    /// `describe` output could not be obtained or parsed
    #[error("describe failed: {0}")]
    Describe(String),

    /// Result file could not be written or read
    #[error("failed to persist results to {path}: {source}")]
    Persist {
        /// Result file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Monitor error
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking filesystem task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, RunnerError>;

impl RunnerError {
    /// Captured command output, if this error carries any.
    pub fn output(&self) -> Option<&CommandOutput> {
        match self {
            RunnerError::Spawn { output, .. } | RunnerError::CommandFailed { output, .. } => {
                Some(output)
            }
            RunnerError::Phase { source, .. } => source.output(),
            _ => None,
        }
    }

    /// Iteration and phase of a phase failure.
    pub fn failed_phase(&self) -> Option<(u32, Version, PhaseKind)> {
        match self {
            RunnerError::Phase {
                iteration,
                version,
                phase,
                ..
            } => Some((*iteration, *version, *phase)),
            _ => None,
        }
    }

    pub(crate) fn setup(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RunnerError::Setup {
            path: path.into(),
            source,
        }
    }
}
