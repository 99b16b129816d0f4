//! # mirrorperf monitoring
//!
//! Background samplers that observe a mirroring run while it happens, and
//! the directory analysis used to verify what it produced.
//!
//! ## Architecture
//!
//! Every monitor is the same [`PollingSession`] driven by a different
//! [`Sampler`]. The session owns the lifecycle and the sample buffer; the
//! sampler reads one OS source per tick and folds samples into metrics.
//!
//! ```text
//! ┌──────────────────┐  start/stop   ┌──────────────────┐  tick  ┌──────────────────┐
//! │   Phase runner   │──────────────▶│  PollingSession  │───────▶│     Sampler      │
//! │                  │◀──────────────│  (buffer, lock)  │◀───────│ (resource, net,  │
//! └──────────────────┘   metrics     └──────────────────┘ sample │  disk, download, │
//!                                                                 │  registry)       │
//!                                                                 └────────┬─────────┘
//!                                                                          ▼
//!                                                                 ┌──────────────────┐
//!                                                                 │ sources::{proc,  │
//!                                                                 │ net, dir, conns} │
//!                                                                 └──────────────────┘
//! ```
//!
//! Sampling is best-effort: an unreadable counter produces a zero sample and
//! never stops the loop.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod disk;
pub mod download;
pub mod error;
pub mod format;
pub mod network;
pub mod output;
pub mod registry;
pub mod resource;
pub mod session;
pub mod sources;

pub use disk::{DiskWriteMetrics, DiskWriteMonitor, DiskWriteSample, DiskWriteSampler};
pub use download::{
    DownloadMetrics, DownloadMonitor, DownloadProgress, DownloadSample, DownloadSampler,
};
pub use error::{MonitorError, Result};
pub use format::{format_bytes_human, format_duration};
pub use network::{BandwidthSample, NetworkMetrics, NetworkMonitor, NetworkSampler};
pub use output::{analyze_output, compare_outputs, OutputComparison, OutputMetrics};
pub use registry::{RegistryMetrics, RegistryMonitor, RegistrySample, RegistrySampler};
pub use resource::{ResourceMetrics, ResourceMonitor, ResourceSample, ResourceSampler};
pub use session::{DoubleStart, PollingSession, Sampler, Tick, Window};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        DiskWriteMonitor, DownloadMonitor, MonitorError, NetworkMonitor, PollingSession,
        RegistryMonitor, ResourceMonitor, Sampler,
    };
}
