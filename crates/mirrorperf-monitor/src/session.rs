//! Generic polling session shared by every monitor.
//!
//! A [`PollingSession`] owns the lifecycle (start, stop, grace period,
//! snapshot) and the sample buffer; a [`Sampler`] supplies the per-tick
//! reading and the aggregation formula. The five concrete monitors are type
//! aliases over this one type.

use crate::error::{MonitorError, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// Default sampling cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default wait after `stop` for a straggler sample.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(500);

/// What a second `start` on a running session does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleStart {
    /// Return `Ok(())` and keep the current session
    Ignore,
    /// Return [`MonitorError::AlreadyRunning`]
    Reject,
}

/// Context handed to the sampler on every tick.
#[derive(Debug, Clone)]
pub struct Tick {
    /// Wall-clock time of the tick
    pub at: DateTime<Utc>,
    /// Process the session is currently targeting, if any
    pub pid: Option<u32>,
    /// Time since the session started
    pub since_start: Duration,
}

/// Time span an aggregate covers.
#[derive(Debug, Clone)]
pub struct Window {
    /// Session start
    pub started_at: DateTime<Utc>,
    /// Session stop, or "now" for a snapshot
    pub ended_at: DateTime<Utc>,
    /// `ended_at - started_at`
    pub duration: Duration,
    /// Whether the session had stopped when the aggregate was computed
    pub complete: bool,
}

impl Window {
    /// Window of a session that never started.
    fn empty() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            ended_at: now,
            duration: Duration::ZERO,
            complete: true,
        }
    }
}

/// Sample source plus aggregation policy for one monitor kind.
///
/// `sample` runs on the blocking pool once per tick. It must never fail: an
/// unreadable OS counter yields a zero-valued sample.
pub trait Sampler: Send + 'static {
    /// One instantaneous reading
    type Sample: Clone + Send + Sync + 'static;
    /// Aggregate over a full sample sequence
    type Metrics: Clone + Default + Send + Sync + 'static;

    /// Label used in logs and errors
    const KIND: &'static str;
    /// Behaviour of `start` while already running
    const DOUBLE_START: DoubleStart;

    /// Capture any baseline at start.
    fn begin(&mut self, _tick: &Tick) {}

    /// Produce the sample for one tick.
    fn sample(&mut self, tick: &Tick) -> Self::Sample;

    /// Fold samples into metrics.
    fn aggregate(&self, samples: &[Self::Sample], window: &Window) -> Self::Metrics;

    /// Release per-session resources once the session is stopped.
    fn finish(&mut self) {}
}

struct State<S: Sampler> {
    running: bool,
    frozen: bool,
    generation: u64,
    started: Option<(Instant, DateTime<Utc>)>,
    stopped: Option<(Instant, DateTime<Utc>)>,
    samples: Vec<S::Sample>,
    poll_interval: Duration,
    stop_grace: Duration,
    target_pid: Option<u32>,
    last_metrics: Option<S::Metrics>,
}

impl<S: Sampler> State<S> {
    fn window(&self, ended: Option<(Instant, DateTime<Utc>)>) -> Window {
        let Some((start_instant, started_at)) = self.started else {
            return Window::empty();
        };
        let (end_instant, ended_at) = ended.unwrap_or_else(|| (Instant::now(), Utc::now()));
        Window {
            started_at,
            ended_at,
            duration: end_instant.saturating_duration_since(start_instant),
            complete: ended.is_some(),
        }
    }
}

struct Shared<S: Sampler> {
    state: RwLock<State<S>>,
    sampler: Mutex<S>,
}

/// A monitor session: one background sampling task, one sample buffer.
///
/// Cloning yields another handle to the same session.
pub struct PollingSession<S: Sampler> {
    shared: Arc<Shared<S>>,
}

impl<S: Sampler> Clone for PollingSession<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Sampler> PollingSession<S> {
    /// Wrap a sampler in an unstarted session.
    pub fn new(sampler: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State {
                    running: false,
                    frozen: false,
                    generation: 0,
                    started: None,
                    stopped: None,
                    samples: Vec::new(),
                    poll_interval: DEFAULT_POLL_INTERVAL,
                    stop_grace: DEFAULT_STOP_GRACE,
                    target_pid: None,
                    last_metrics: None,
                }),
                sampler: Mutex::new(sampler),
            }),
        }
    }

    /// Builder-style poll interval.
    pub fn with_poll_interval(self, interval: Duration) -> Self {
        self.set_poll_interval(interval);
        self
    }

    /// Builder-style stop grace period.
    pub fn with_stop_grace(self, grace: Duration) -> Self {
        self.set_stop_grace(grace);
        self
    }

    /// Change the sampling cadence. Takes effect on the next `start`.
    pub fn set_poll_interval(&self, interval: Duration) {
        let interval = interval.max(Duration::from_millis(1));
        self.shared.state.write().poll_interval = interval;
    }

    /// Current sampling cadence.
    pub fn poll_interval(&self) -> Duration {
        self.shared.state.read().poll_interval
    }

    /// Change the stop grace period.
    pub fn set_stop_grace(&self, grace: Duration) {
        self.shared.state.write().stop_grace = grace;
    }

    /// Retarget the session at `pid`. Safe while the sampling loop runs.
    pub fn set_target_pid(&self, pid: u32) {
        self.shared.state.write().target_pid = Some(pid);
    }

    /// Process the session is targeting.
    pub fn target_pid(&self) -> Option<u32> {
        self.shared.state.read().target_pid
    }

    /// Target `pid` and start in one step, for use inside a spawn hook.
    pub fn start_for_pid(&self, pid: u32) -> Result<()> {
        self.set_target_pid(pid);
        self.start()
    }

    /// Start sampling in the background.
    ///
    /// Resets the sample buffer and records the start time. Must be called
    /// from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| MonitorError::NoRuntime(S::KIND))?;

        let (generation, interval, pid, since) = {
            let mut state = self.shared.state.write();
            if state.running {
                return match S::DOUBLE_START {
                    DoubleStart::Ignore => Ok(()),
                    DoubleStart::Reject => Err(MonitorError::AlreadyRunning(S::KIND)),
                };
            }
            let started = (Instant::now(), Utc::now());
            state.running = true;
            state.frozen = false;
            state.generation += 1;
            state.started = Some(started);
            state.stopped = None;
            state.samples.clear();
            state.last_metrics = None;
            (state.generation, state.poll_interval, state.target_pid, started)
        };

        // Baseline is captured before the loop exists, so the first tick
        // always sees it.
        self.shared.sampler.lock().begin(&Tick {
            at: since.1,
            pid,
            since_start: Duration::ZERO,
        });

        runtime.spawn(sampling_loop(Arc::clone(&self.shared), generation, interval));
        debug!(monitor = S::KIND, ?interval, pid, "monitor started");
        Ok(())
    }

    /// Stop sampling and return the aggregate.
    ///
    /// Waits out the grace period so a tick that began before the stop can
    /// still land, then freezes the buffer. Stopping an unstarted session
    /// yields a zero-valued aggregate; stopping twice yields the same
    /// aggregate twice.
    pub async fn stop(&self) -> S::Metrics {
        let (grace, generation) = {
            let mut state = self.shared.state.write();
            if !state.running {
                return state.last_metrics.clone().unwrap_or_default();
            }
            state.running = false;
            state.stopped = Some((Instant::now(), Utc::now()));
            (state.stop_grace, state.generation)
        };

        tokio::time::sleep(grace).await;

        let (samples, window) = {
            let mut state = self.shared.state.write();
            state.frozen = true;
            (state.samples.clone(), state.window(state.stopped))
        };

        let shared = Arc::clone(&self.shared);
        let metrics = match tokio::task::spawn_blocking(move || {
            let mut sampler = shared.sampler.lock();
            sampler.finish();
            sampler.aggregate(&samples, &window)
        })
        .await
        {
            Ok(metrics) => metrics,
            Err(err) => {
                warn!(monitor = S::KIND, error = %err, "aggregation task failed");
                S::Metrics::default()
            }
        };

        let mut state = self.shared.state.write();
        if state.generation == generation {
            state.last_metrics = Some(metrics.clone());
        }
        debug!(monitor = S::KIND, samples = state.samples.len(), "monitor stopped");
        metrics
    }

    /// Aggregate of the samples collected so far, without stopping.
    ///
    /// `None` when the session is not running. Aggregation waits on the
    /// sampler, which a slow tick may hold, so it runs on the blocking pool.
    pub async fn snapshot(&self) -> Option<S::Metrics> {
        let (samples, window) = {
            let state = self.shared.state.read();
            if !state.running {
                return None;
            }
            (state.samples.clone(), state.window(None))
        };

        let shared = Arc::clone(&self.shared);
        match tokio::task::spawn_blocking(move || shared.sampler.lock().aggregate(&samples, &window))
            .await
        {
            Ok(metrics) => Some(metrics),
            Err(err) => {
                warn!(monitor = S::KIND, error = %err, "snapshot task failed");
                None
            }
        }
    }

    /// Whether the sampling loop is live.
    pub fn is_monitoring(&self) -> bool {
        self.shared.state.read().running
    }

    /// Elapsed time while running, final wall time once stopped.
    pub fn duration(&self) -> Duration {
        let state = self.shared.state.read();
        match (state.started, state.stopped) {
            (Some((start, _)), Some((stop, _))) if !state.running => {
                stop.saturating_duration_since(start)
            }
            (Some((start, _)), _) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Number of samples recorded in the current or last session.
    pub fn sample_count(&self) -> usize {
        self.shared.state.read().samples.len()
    }

    /// Copy of the recorded samples.
    pub fn samples(&self) -> Vec<S::Sample> {
        self.shared.state.read().samples.clone()
    }

    /// Run `f` with exclusive access to the sampler.
    pub fn with_sampler<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.shared.sampler.lock())
    }
}

async fn sampling_loop<S: Sampler>(shared: Arc<Shared<S>>, generation: u64, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let (pid, started) = {
            let state = shared.state.read();
            if !state.running || state.generation != generation {
                break;
            }
            (state.target_pid, state.started)
        };

        let tick_started = Instant::now();
        let tick = Tick {
            at: Utc::now(),
            pid,
            since_start: started
                .map(|(at, _)| tick_started.saturating_duration_since(at))
                .unwrap_or_default(),
        };

        let worker = Arc::clone(&shared);
        let sample = match tokio::task::spawn_blocking(move || worker.sampler.lock().sample(&tick))
            .await
        {
            Ok(sample) => sample,
            Err(err) => {
                warn!(monitor = S::KIND, error = %err, "sample task failed");
                continue;
            }
        };

        let mut state = shared.state.write();
        let in_session = state.generation == generation
            && !state.frozen
            && state.stopped.map_or(true, |(at, _)| tick_started <= at);
        if !in_session {
            break;
        }
        state.samples.push(sample);
    }

    trace!(monitor = S::KIND, generation, "sampling loop exited");
}
