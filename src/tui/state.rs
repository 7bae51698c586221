//! Everything one TUI frame needs, copied out of the session so drawing
//! never holds a session lock.

use crate::errors::SpeedTestError;
use crate::labels::Labels;
use crate::progress::{Phase, ProgressEvent};
use crate::rating::Rating;
use crate::session::SessionSnapshot;
use crate::share::ShareOutcome;
use crate::stats::speed_to_position;

/// Error information for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub message: String,
    pub suggestion: Option<String>,
}

impl From<&SpeedTestError> for ErrorInfo {
    fn from(error: &SpeedTestError) -> Self {
        Self {
            message: error.message.clone(),
            suggestion: error.suggestion.clone(),
        }
    }
}

/// State for the TUI display.
#[derive(Debug, Clone)]
pub struct TuiState {
    pub snapshot: SessionSnapshot,
    /// Rating of the latest result
    pub rating: Option<Rating>,
    /// Last round trip of the running ping phase, with its probe number
    /// and the probe count
    pub last_probe: Option<(f64, usize, usize)>,
    pub error: Option<ErrorInfo>,
    /// Set after a native share succeeded
    pub shared: bool,
    pub labels: Labels,
    pub terminal_width: u16,
}

impl Default for TuiState {
    fn default() -> Self {
        Self::new(Labels::default())
    }
}

impl TuiState {
    pub fn new(labels: Labels) -> Self {
        Self {
            snapshot: SessionSnapshot::default(),
            rating: None,
            last_probe: None,
            error: None,
            shared: false,
            labels,
            terminal_width: 80,
        }
    }

    /// Take over the session's latest figures.
    pub fn sync(&mut self, snapshot: SessionSnapshot, rating: Option<Rating>) {
        self.snapshot = snapshot;
        self.rating = rating;
    }

    pub fn update_from_event(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::PhaseChange(Phase::Ping) => {
                self.error = None;
                self.shared = false;
                self.last_probe = None;
            }
            ProgressEvent::LatencySample { value_ms, current, total } => {
                self.last_probe = Some((*value_ms, *current, *total));
            }
            ProgressEvent::Error(message) => {
                self.error = Some(ErrorInfo {
                    message: message.clone(),
                    suggestion: None,
                });
            }
            _ => {}
        }
    }

    pub fn set_error(&mut self, error: &SpeedTestError) {
        self.error = Some(ErrorInfo::from(error));
    }

    pub fn set_share_outcome(&mut self, outcome: ShareOutcome) {
        self.shared = outcome == ShareOutcome::Shared;
    }

    pub fn phase(&self) -> Phase {
        self.snapshot.phase
    }

    /// Needle position of the eased display speed.
    pub fn gauge_position(&self) -> f64 {
        speed_to_position(self.snapshot.display_speed)
    }

    /// Ratio for the progress bar, 0 to 1.
    pub fn progress_ratio(&self) -> f64 {
        (self.snapshot.progress / 100.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::BandwidthDirection;

    #[test]
    fn test_latency_sample_is_kept() {
        let mut state = TuiState::default();

        state.update_from_event(&ProgressEvent::LatencySample {
            value_ms: 18.0,
            current: 3,
            total: 20,
        });

        assert_eq!(state.last_probe, Some((18.0, 3, 20)));
    }

    #[test]
    fn test_new_run_clears_error_and_probe() {
        let mut state = TuiState::default();
        state.update_from_event(&ProgressEvent::Error("boom".into()));
        state.last_probe = Some((20.0, 1, 20));
        state.shared = true;
        assert!(state.error.is_some());

        state.update_from_event(&ProgressEvent::PhaseChange(Phase::Ping));

        assert!(state.error.is_none());
        assert!(state.last_probe.is_none());
        assert!(!state.shared);
    }

    #[test]
    fn test_speed_samples_do_not_touch_state() {
        let mut state = TuiState::default();

        state.update_from_event(&ProgressEvent::SpeedSample {
            direction: BandwidthDirection::Download,
            speed_mbps: 90.0,
        });

        assert_eq!(state.snapshot, SessionSnapshot::default());
    }

    #[test]
    fn test_error_keeps_suggestion() {
        let mut state = TuiState::default();
        let error = SpeedTestError::network("connection refused")
            .with_suggestion("Check your network connection.");

        state.set_error(&error);

        let info = state.error.unwrap();
        assert_eq!(info.message, "connection refused");
        assert_eq!(
            info.suggestion.as_deref(),
            Some("Check your network connection.")
        );
    }

    #[test]
    fn test_ratios_are_clamped() {
        let mut state = TuiState::default();
        state.snapshot.progress = 140.0;
        state.snapshot.display_speed = 9000.0;

        assert_eq!(state.progress_ratio(), 1.0);
        assert_eq!(state.gauge_position(), 1.0);
    }
}
