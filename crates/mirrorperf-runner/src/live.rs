//! Read-only view of the run while it is in progress.

use mirrorperf_monitor::{DownloadProgress, RegistryMetrics, RegistryMonitor};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Default)]
struct LiveInner {
    registry: Option<RegistryMonitor>,
    progress: Option<DownloadProgress>,
}

/// Shared handle answering "what is being observed right now".
///
/// Cloning yields another handle to the same state.
#[derive(Clone, Default)]
pub struct LiveStatus {
    inner: Arc<RwLock<LiveInner>>,
}

impl LiveStatus {
    /// Empty status: nothing monitoring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the registry monitor of the running upload phase.
    pub fn attach_registry(&self, monitor: RegistryMonitor) {
        self.inner.write().registry = Some(monitor);
    }

    /// Withdraw the registry monitor.
    pub fn detach_registry(&self) {
        self.inner.write().registry = None;
    }

    /// Aggregate of the registry samples collected so far.
    ///
    /// `None` when no registry monitor is running.
    pub async fn current(&self) -> Option<RegistryMetrics> {
        let monitor = self.inner.read().registry.clone()?;
        monitor.snapshot().await
    }

    /// Whether a registry monitor is attached and running.
    pub fn is_monitoring(&self) -> bool {
        self.inner
            .read()
            .registry
            .as_ref()
            .is_some_and(|monitor| monitor.is_monitoring())
    }

    /// Record a download progress event.
    pub fn record_progress(&self, progress: DownloadProgress) {
        self.inner.write().progress = Some(progress);
    }

    /// Most recent download progress event.
    pub fn latest_progress(&self) -> Option<DownloadProgress> {
        self.inner.read().progress.clone()
    }
}
