//! # mirrorperf runner
//!
//! Runs oc-mirror repeatedly and turns each run into comparable results.
//!
//! An [`Orchestrator`] owns one workspace and walks a fixed state machine:
//! set up, run N iterations per version group (the first one clean, the rest
//! reusing the cache), compare, save. Each iteration is a download phase and
//! an upload phase run by the [`PhaseRunner`], which brackets one
//! [`MirrorExecutor`] call with the monitors from `mirrorperf-monitor`.
//!
//! ```no_run
//! use mirrorperf_config::HarnessConfig;
//! use mirrorperf_runner::{OcMirrorExecutor, Orchestrator};
//! use std::sync::Arc;
//!
//! # async fn example() -> mirrorperf_runner::Result<()> {
//! let config = HarnessConfig {
//!     registry_url: "registry.lab:5000".into(),
//!     ..HarnessConfig::default()
//! };
//! let executor = Arc::new(OcMirrorExecutor::new(&config.mirror_binary));
//! let outcome = Orchestrator::new(config, executor).run().await?;
//! println!("saved {}", outcome.results_path.display());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod classify;
pub mod compare;
pub mod describe;
pub mod error;
pub mod executor;
pub mod live;
pub mod orchestrator;
pub mod phase;
pub mod report;
pub mod result;
pub mod store;
pub mod workspace;

pub use classify::ExtendedMetrics;
pub use compare::{
    compare_clean_vs_cached, compare_versions, CleanVsCached, MetricComparison, VersionComparison,
};
pub use describe::DescribeMetrics;
pub use error::{Result, RunnerError};
pub use executor::{CommandOutput, MirrorExecutor, MirrorInvocation, OcMirrorExecutor, SpawnHook};
pub use live::LiveStatus;
pub use orchestrator::{Orchestrator, RunEvent, RunOutcome, RunState};
pub use phase::{PhaseKind, PhaseMetrics, PhaseRunner, PhaseSpec};
pub use result::TestResult;
pub use store::ResultStore;
pub use workspace::Workspace;
