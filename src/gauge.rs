//! Speed gauge animation.
//!
//! The measurement code only ever writes the latest target speed. What the
//! gauge shows is a separate display value that an animator task moves
//! toward the target a little every frame, so the needle glides instead of
//! jumping between samples.

use crate::stats::speed_to_position;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Share of the remaining distance covered per frame.
pub const EASING: f64 = 0.12;

/// Distance below which the display value settles on the target.
pub const SETTLE_EPSILON: f64 = 0.05;

/// Roughly 60 frames per second.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// `1 - (1 - t)^3` for `t` in [0, 1].
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ResetAnimation {
    from: f64,
    started: Instant,
    duration: Duration,
}

/// Display and target values of the gauge, advanced one frame at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaugeModel {
    display: f64,
    target: f64,
    reset: Option<ResetAnimation>,
}

impl GaugeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display(&self) -> f64 {
        self.display
    }

    /// Aim at a new speed. A running reset is abandoned and easing resumes
    /// from wherever the display value currently is.
    pub fn set_target(&mut self, speed_mbps: f64) {
        self.target =
            if speed_mbps.is_finite() { speed_mbps.max(0.0) } else { 0.0 };
        self.reset = None;
    }

    /// Animate back to zero over `duration` with a cubic ease-out.
    pub fn begin_reset(&mut self, now: Instant, duration: Duration) {
        self.target = 0.0;

        if duration.is_zero() || self.display == 0.0 {
            self.snap_to_zero();
            return;
        }

        self.reset =
            Some(ResetAnimation { from: self.display, started: now, duration });
    }

    pub fn snap_to_zero(&mut self) {
        self.display = 0.0;
        self.target = 0.0;
        self.reset = None;
    }

    /// Advance one frame and return the new display value.
    pub fn step(&mut self, now: Instant) -> f64 {
        if let Some(reset) = self.reset {
            let t = now.saturating_duration_since(reset.started).as_secs_f64()
                / reset.duration.as_secs_f64();

            if t >= 1.0 {
                self.display = 0.0;
                self.reset = None;
            } else {
                self.display = reset.from * (1.0 - ease_out_cubic(t));
            }

            return self.display;
        }

        let remaining = self.target - self.display;
        if remaining.abs() < SETTLE_EPSILON {
            self.display = self.target;
        } else {
            self.display += remaining * EASING;
        }

        self.display
    }

    /// Needle position on the logarithmic [0, 1] scale.
    pub fn position(&self) -> f64 {
        speed_to_position(self.display)
    }
}

/// The shared gauge: a [`GaugeModel`] plus the task animating it.
///
/// Created inside a tokio runtime the gauge animates itself; elsewhere
/// frames have to be driven with [`Gauge::tick`].
#[derive(Debug)]
pub struct Gauge {
    model: Arc<Mutex<GaugeModel>>,
    animator: Option<JoinHandle<()>>,
}

impl Gauge {
    pub fn new() -> Self {
        let model = Arc::new(Mutex::new(GaugeModel::new()));
        let animator = spawn_animator(Arc::clone(&model));

        Self { model, animator }
    }

    pub fn is_animated(&self) -> bool {
        self.animator.is_some()
    }

    pub fn set_target(&self, speed_mbps: f64) {
        lock(&self.model).set_target(speed_mbps);
    }

    pub fn reset(&self, duration: Duration) {
        lock(&self.model).begin_reset(Instant::now(), duration);
    }

    pub fn snap_to_zero(&self) {
        lock(&self.model).snap_to_zero();
    }

    pub fn tick(&self, now: Instant) -> f64 {
        lock(&self.model).step(now)
    }

    pub fn display_speed(&self) -> f64 {
        lock(&self.model).display()
    }

    pub fn position(&self) -> f64 {
        lock(&self.model).position()
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Gauge {
    fn drop(&mut self) {
        if let Some(animator) = self.animator.take() {
            animator.abort();
        }
    }
}

fn lock(model: &Mutex<GaugeModel>) -> MutexGuard<'_, GaugeModel> {
    model.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn spawn_animator(model: Arc<Mutex<GaugeModel>>) -> Option<JoinHandle<()>> {
    let runtime = tokio::runtime::Handle::try_current().ok()?;

    Some(runtime.spawn(async move {
        let mut frames = interval(FRAME_INTERVAL);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            frames.tick().await;
            lock(&model).step(Instant::now());
        }
    }))
}
