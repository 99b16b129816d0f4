pub mod analyze;
pub mod compare;
pub mod config;
pub mod run;

use anyhow::{Context, Result};
use mirrorperf_config::{ConfigError, HarnessConfig};
use mirrorperf_runner::RunnerError;
use std::path::PathBuf;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success = 0,
    Mismatch = 1,
    ConfigError = 2,
    RunFailed = 3,
}

impl From<Exit> for std::process::ExitCode {
    fn from(exit: Exit) -> Self {
        std::process::ExitCode::from(exit as u8)
    }
}

/// Exit code for a command that failed with `err`.
pub fn exit_for_error(err: &anyhow::Error) -> Exit {
    let config_error = err.chain().any(|cause| {
        cause.is::<ConfigError>() || matches!(
            cause.downcast_ref::<RunnerError>(),
            Some(RunnerError::Config(_))
        )
    });
    if config_error {
        Exit::ConfigError
    } else {
        Exit::RunFailed
    }
}

/// Config file (explicit, `MIRRORPERF_CONFIG`, or default location) or
/// built-in defaults.
pub fn load_config(explicit: Option<PathBuf>) -> Result<HarnessConfig> {
    match HarnessConfig::resolve_path(explicit) {
        Some(path) => HarnessConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(HarnessConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_map_to_exit_two() {
        let err = anyhow::Error::new(RunnerError::Config(ConfigError::Validation("x".into())));
        assert_eq!(exit_for_error(&err), Exit::ConfigError);

        let err = anyhow::Error::new(ConfigError::Validation("x".into())).context("loading");
        assert_eq!(exit_for_error(&err), Exit::ConfigError);

        let err = anyhow::Error::new(RunnerError::Describe("boom".into()));
        assert_eq!(exit_for_error(&err), Exit::RunFailed);
    }
}
