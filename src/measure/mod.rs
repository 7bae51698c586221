//! The three measurement phases and the engine that sequences them.

pub mod download;
pub mod engine;
pub mod ledger;
pub mod payload;
pub mod ping;
pub mod upload;

pub use engine::{EngineOutput, TestConfig, TestEngine};
pub use ping::PingResult;

use crate::progress::{BandwidthDirection, ProgressCallback, ProgressEvent};
use crate::stats::{median, round_to};
use log::debug;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Aggregated figure of a throughput phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThroughputResult {
    /// Median of the live samples, rounded to one decimal
    pub speed_mbps: f64,
    /// Every live sample, in order
    pub samples: Vec<f64>,
}

impl ThroughputResult {
    pub fn from_samples(samples: Vec<f64>) -> Self {
        Self { speed_mbps: round_to(median(&samples), 1), samples }
    }
}

/// Timing of a throughput phase's sampling ticker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SamplerTiming {
    pub direction: BandwidthDirection,
    pub duration: Duration,
    pub cadence: Duration,
}

/// Drive a throughput phase: every `cadence` read the current rate from
/// `rate`, publish it, and end the phase by cancelling `phase` once
/// `duration` has elapsed. Returns the collected samples.
///
/// Stops early, without a final sample, when `phase` is cancelled from
/// outside.
pub(crate) async fn run_sampler<F>(
    timing: SamplerTiming,
    started: Instant,
    phase: &CancellationToken,
    progress: &dyn ProgressCallback,
    mut rate: F,
) -> Vec<f64>
where
    F: FnMut(Instant) -> f64,
{
    let mut samples = Vec::new();
    let mut ticker = interval_at(started + timing.cadence, timing.cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = phase.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        let speed_mbps = rate(now);
        samples.push(speed_mbps);

        progress.on_progress(ProgressEvent::SpeedSample {
            direction: timing.direction,
            speed_mbps,
        });

        let elapsed = now.saturating_duration_since(started);
        progress.on_progress(ProgressEvent::Progress {
            phase: timing.direction.phase(),
            percent: phase_percent(elapsed, timing.duration),
        });

        if elapsed >= timing.duration {
            debug!(
                "{:?} phase budget of {:?} elapsed after {} samples",
                timing.direction,
                timing.duration,
                samples.len()
            );
            phase.cancel();
            break;
        }
    }

    samples
}

/// `elapsed / duration` as a percentage, held below 100 until the phase
/// reports completion.
pub fn phase_percent(elapsed: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 99.0;
    }

    (elapsed.as_secs_f64() / duration.as_secs_f64() * 100.0).min(99.0)
}
