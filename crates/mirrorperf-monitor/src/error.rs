//! Error types for the monitoring system.

use thiserror::Error;

/// Monitoring errors.
///
/// Sampling itself never fails; these only surface from lifecycle calls and
/// one-shot directory analysis.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Monitor kind that rejects a second `start`
    #[error("{0} monitor is already running")]
    AlreadyRunning(&'static str),

    /// No tokio runtime to host the sampling task
    #[error("cannot start {0} monitor outside a tokio runtime")]
    NoRuntime(&'static str),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory walk failed at the root
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Background analysis task panicked or was cancelled
    #[error("Analysis task failed: {0}")]
    Task(String),
}

/// Result type for monitoring operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

impl From<tokio::task::JoinError> for MonitorError {
    fn from(err: tokio::task::JoinError) -> Self {
        MonitorError::Task(err.to_string())
    }
}
