//! The caller-facing speed test session.
//!
//! A [`SpeedTestSession`] owns the transport, the gauge, the history and
//! the phase state machine:
//!
//! ```text
//! Idle -> Ping -> Download -> Upload -> Complete
//!   ^______________ stop _______________|
//! ```
//!
//! `start` is accepted from `Idle` and `Complete` only. `stop` cancels the
//! running measurement and returns to `Idle` without recording anything.

use crate::echo::Transport;
use crate::errors::SpeedTestError;
use crate::gauge::Gauge;
use crate::history::History;
use crate::labels::Labels;
use crate::measure::{EngineOutput, TestConfig, TestEngine};
use crate::progress::{
    BandwidthDirection, Phase, ProgressCallback, ProgressEvent,
};
use crate::rating::Rating;
use crate::results::SpeedTestResult;
use crate::share::{CopiedFlag, ShareOutcome, Sharer};
use log::{error, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of a session for rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    /// Completion of the active phase, 0-100
    pub progress: f64,
    /// Eased gauge value in Mbps
    pub display_speed: f64,
    pub ping: f64,
    pub jitter: f64,
    pub download_speed: f64,
    pub upload_speed: f64,
    pub history: Vec<SpeedTestResult>,
    pub copied: bool,
}

#[derive(Debug, Default)]
struct LiveState {
    phase: Phase,
    progress: f64,
    ping: f64,
    jitter: f64,
    download_speed: f64,
    upload_speed: f64,
}

struct ActiveRun {
    id: u64,
    token: CancellationToken,
}

pub struct SpeedTestSession<T> {
    transport: T,
    config: TestConfig,
    labels: Labels,
    gauge: Gauge,
    state: Mutex<LiveState>,
    history: Mutex<History>,
    sharer: Sharer,
    copied: CopiedFlag,
    active: Mutex<Option<ActiveRun>>,
    runs: AtomicU64,
    observer: Option<Box<dyn ProgressCallback>>,
}

impl<T: Transport> SpeedTestSession<T> {
    pub fn new(transport: T, config: TestConfig, history: History) -> Self {
        Self {
            transport,
            config,
            labels: Labels::default(),
            gauge: Gauge::new(),
            state: Mutex::new(LiveState::default()),
            history: Mutex::new(history),
            sharer: Sharer::default(),
            copied: CopiedFlag::new(),
            active: Mutex::new(None),
            runs: AtomicU64::new(0),
            observer: None,
        }
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_sharer(mut self, sharer: Sharer) -> Self {
        self.sharer = sharer;
        self
    }

    /// Forward every progress event of future runs to `observer` too.
    pub fn with_observer(
        mut self,
        observer: Box<dyn ProgressCallback>,
    ) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn gauge(&self) -> &Gauge {
        &self.gauge
    }

    /// Run ping, download and upload, then record the result.
    ///
    /// Fails with an invalid-state error while another run is in progress,
    /// and with a cancellation error when [`stop`](Self::stop) interrupts
    /// the run.
    pub async fn start(&self) -> Result<SpeedTestResult, SpeedTestError> {
        let (id, token) = self.begin()?;

        let observer = RunObserver { session: self, token: &token };
        let engine = TestEngine::new(&self.transport, &self.config);
        let outcome = engine.run(&token, &observer, &self.gauge).await;

        self.finish(id, outcome)
    }

    /// Cancel the running measurement, if any, and return to `Idle`.
    pub fn stop(&self) {
        let active = lock(&self.active).take();

        if let Some(run) = active {
            info!("Stopping run {}", run.id);
            run.token.cancel();
        }

        self.gauge.snap_to_zero();

        let mut state = lock(&self.state);
        if state.phase.is_running() {
            state.phase = Phase::Idle;
            state.progress = 0.0;
        }
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
    }

    /// Share the summary of the latest result.
    pub async fn share(&self) -> Result<ShareOutcome, SpeedTestError> {
        let result = self.latest_result().ok_or_else(|| {
            SpeedTestError::invalid_state("there is no result to share yet")
        })?;

        let text = result.summary_text(&self.labels);
        let outcome = self.sharer.share(&text).await?;
        if outcome == ShareOutcome::Copied {
            self.copied.set(Instant::now());
        }

        Ok(outcome)
    }

    pub fn latest_result(&self) -> Option<SpeedTestResult> {
        lock(&self.history).latest().cloned()
    }

    /// Rating of the latest result.
    pub fn rating(&self) -> Option<Rating> {
        self.latest_result().map(|result| result.rating())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = lock(&self.state);

        SessionSnapshot {
            phase: state.phase,
            progress: state.progress,
            display_speed: self.gauge.display_speed(),
            ping: state.ping,
            jitter: state.jitter,
            download_speed: state.download_speed,
            upload_speed: state.upload_speed,
            history: lock(&self.history).entries().to_vec(),
            copied: self.copied.is_set(Instant::now()),
        }
    }

    fn begin(&self) -> Result<(u64, CancellationToken), SpeedTestError> {
        let mut state = lock(&self.state);
        if !state.phase.can_start() {
            return Err(SpeedTestError::invalid_state(format!(
                "cannot start while the {:?} phase is running",
                state.phase
            )));
        }

        *state = LiveState { phase: Phase::Ping, ..LiveState::default() };

        let id = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        *lock(&self.active) =
            Some(ActiveRun { id, token: token.clone() });

        self.gauge.snap_to_zero();
        info!("Starting run {}", id);

        Ok((id, token))
    }

    fn finish(
        &self,
        id: u64,
        outcome: Result<EngineOutput, SpeedTestError>,
    ) -> Result<SpeedTestResult, SpeedTestError> {
        // A stopped run no longer owns the session state.
        let still_active = {
            let mut active = lock(&self.active);
            let current = active.as_ref().is_some_and(|run| run.id == id);
            if current {
                *active = None;
            }
            current
        };

        if !still_active {
            return Err(SpeedTestError::cancelled());
        }

        match outcome {
            Ok(output) => {
                let result = SpeedTestResult::from_engine_output(&output);

                {
                    let mut state = lock(&self.state);
                    state.phase = Phase::Complete;
                    state.progress = 100.0;
                    state.ping = result.ping_ms;
                    state.jitter = result.jitter_ms;
                    state.download_speed = result.download_speed_mbps;
                    state.upload_speed = result.upload_speed_mbps;
                }

                lock(&self.history).push(result.clone());
                self.gauge.reset(self.config.gauge_reset);
                self.notify(ProgressEvent::PhaseChange(Phase::Complete));

                Ok(result)
            }
            Err(e) if e.is_cancelled() => {
                self.return_to_idle();
                Err(e)
            }
            Err(e) => {
                error!("Speed test failed: {}", e);
                self.notify(ProgressEvent::Error(e.to_string()));
                self.return_to_idle();
                self.gauge.reset(self.config.gauge_reset);
                Err(e)
            }
        }
    }

    fn return_to_idle(&self) {
        let mut state = lock(&self.state);
        state.phase = Phase::Idle;
        state.progress = 0.0;
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(observer) = &self.observer {
            observer.on_progress(event);
        }
    }

    fn apply(&self, event: &ProgressEvent) {
        let mut state = lock(&self.state);

        match *event {
            ProgressEvent::PhaseChange(phase) => {
                state.phase = phase;
                state.progress = 0.0;
            }
            ProgressEvent::Progress { percent, .. } => {
                state.progress = percent;
            }
            ProgressEvent::SpeedSample { direction, speed_mbps }
            | ProgressEvent::BandwidthComplete { direction, speed_mbps } => {
                self.gauge.set_target(speed_mbps);
                match direction {
                    BandwidthDirection::Download => {
                        state.download_speed = speed_mbps
                    }
                    BandwidthDirection::Upload => {
                        state.upload_speed = speed_mbps
                    }
                }
            }
            ProgressEvent::LatencyComplete { ping_ms, jitter_ms } => {
                state.ping = ping_ms;
                state.jitter = jitter_ms;
            }
            ProgressEvent::LatencySample { .. } | ProgressEvent::Error(_) => {}
        }
    }
}

/// Applies a run's events to its session until the run is cancelled.
struct RunObserver<'a, T> {
    session: &'a SpeedTestSession<T>,
    token: &'a CancellationToken,
}

impl<T: Transport> ProgressCallback for RunObserver<'_, T> {
    fn on_progress(&self, event: ProgressEvent) {
        if self.token.is_cancelled() {
            return;
        }

        self.session.apply(&event);
        self.session.notify(event);
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
