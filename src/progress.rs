//! Progress event types and callback interface.
//!
//! Defines the phases of a run, the events emitted while measuring, and the
//! callback trait the session and front ends receive them through.

/// Phases of a speed test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Ready to start.
    #[default]
    Idle,
    /// Measuring round-trip latency.
    Ping,
    /// Measuring download throughput.
    Download,
    /// Measuring upload throughput.
    Upload,
    /// All three measurements finished.
    Complete,
}

impl Phase {
    /// Whether a new run may start from this phase.
    pub fn can_start(self) -> bool {
        matches!(self, Phase::Idle | Phase::Complete)
    }

    /// Whether a measurement is currently running.
    pub fn is_running(self) -> bool {
        matches!(self, Phase::Ping | Phase::Download | Phase::Upload)
    }
}

/// Direction of bandwidth measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthDirection {
    /// Download test
    Download,
    /// Upload test
    Upload,
}

impl BandwidthDirection {
    pub fn phase(self) -> Phase {
        match self {
            BandwidthDirection::Download => Phase::Download,
            BandwidthDirection::Upload => Phase::Upload,
        }
    }
}

/// Progress events emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The active phase changed.
    PhaseChange(Phase),
    /// Completion of the active phase, 0-100.
    Progress {
        phase: Phase,
        percent: f64,
    },
    /// A ping probe completed.
    LatencySample {
        /// Measured round trip in milliseconds
        value_ms: f64,
        /// Current probe number (1-indexed)
        current: usize,
        /// Total number of probes
        total: usize,
    },
    /// A live throughput sample from the sampling ticker.
    SpeedSample {
        direction: BandwidthDirection,
        speed_mbps: f64,
    },
    /// The ping phase finished.
    LatencyComplete {
        ping_ms: f64,
        jitter_ms: f64,
    },
    /// A throughput phase finished with its median speed.
    BandwidthComplete {
        direction: BandwidthDirection,
        speed_mbps: f64,
    },
    /// The run was aborted by an unexpected error.
    Error(String),
}

/// Callback interface for progress updates.
///
/// Implementations must be non-blocking to avoid affecting
/// measurement accuracy.
pub trait ProgressCallback: Send + Sync {
    /// Called when a progress event occurs.
    fn on_progress(&self, event: ProgressEvent);
}

/// Callback that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressCallback for NoopProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

impl<F> ProgressCallback for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}
