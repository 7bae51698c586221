//! Result data structures for speed test output.
//!
//! A [`SpeedTestResult`] is created once per completed run and never
//! changed afterwards. It is what the history stores and what the share
//! summary and JSON output are built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::labels::Labels;
use crate::measure::EngineOutput;
use crate::rating::{rate, Rating};

/// Figures of one completed run.
///
/// Only built after ping, download and upload all finished; an aborted run
/// produces no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedTestResult {
    /// Median download speed in Mbps
    pub download_speed_mbps: f64,
    /// Median upload speed in Mbps
    pub upload_speed_mbps: f64,
    /// Median round trip in milliseconds
    pub ping_ms: f64,
    /// Round-trip standard deviation in milliseconds
    pub jitter_ms: f64,
    /// When the run completed
    pub timestamp: DateTime<Utc>,
}

impl SpeedTestResult {
    pub fn new(
        download_speed_mbps: f64,
        upload_speed_mbps: f64,
        ping_ms: f64,
        jitter_ms: f64,
    ) -> Self {
        Self {
            download_speed_mbps: non_negative(download_speed_mbps),
            upload_speed_mbps: non_negative(upload_speed_mbps),
            ping_ms: non_negative(ping_ms),
            jitter_ms: non_negative(jitter_ms),
            timestamp: Utc::now(),
        }
    }

    pub fn from_engine_output(output: &EngineOutput) -> Self {
        Self::new(
            output.download.speed_mbps,
            output.upload.speed_mbps,
            output.ping.ping_ms,
            output.ping.jitter_ms,
        )
    }

    pub fn rating(&self) -> Rating {
        rate(self)
    }

    /// One line per figure, for sharing.
    pub fn summary_text(&self, labels: &Labels) -> String {
        format!(
            "{}: {:.1} {}\n{}: {:.1} {}\n{}: {:.0} {}\n{}: {:.1} {}",
            labels.download,
            self.download_speed_mbps,
            labels.speed_unit,
            labels.upload,
            self.upload_speed_mbps,
            labels.speed_unit,
            labels.ping,
            self.ping_ms,
            labels.latency_unit,
            labels.jitter,
            self.jitter_ms,
            labels.latency_unit,
        )
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Machine-readable output of a run: the result plus its rating.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultReport<'a> {
    #[serde(flatten)]
    pub result: &'a SpeedTestResult,
    pub rating: Rating,
}

impl<'a> ResultReport<'a> {
    pub fn new(result: &'a SpeedTestResult) -> Self {
        Self { result, rating: result.rating() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{PingResult, ThroughputResult};

    #[test]
    fn test_from_engine_output() {
        let output = EngineOutput {
            ping: PingResult::from_samples(vec![20.0, 22.0, 21.0, 1000.0]),
            download: ThroughputResult::from_samples(vec![95.0, 100.0, 105.0]),
            upload: ThroughputResult::from_samples(vec![40.0, 42.5]),
        };

        let result = SpeedTestResult::from_engine_output(&output);

        assert_eq!(result.download_speed_mbps, 100.0);
        assert_eq!(result.upload_speed_mbps, 41.3);
        assert_eq!(result.ping_ms, 22.0);
        assert!(result.jitter_ms > 0.0);
    }

    #[test]
    fn test_figures_are_never_negative() {
        let result = SpeedTestResult::new(-1.0, f64::NAN, -0.5, 3.0);

        assert_eq!(result.download_speed_mbps, 0.0);
        assert_eq!(result.upload_speed_mbps, 0.0);
        assert_eq!(result.ping_ms, 0.0);
        assert_eq!(result.jitter_ms, 3.0);
    }

    #[test]
    fn test_serializes_with_camel_case_keys() {
        let result = SpeedTestResult::new(100.0, 40.0, 21.0, 1.2);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["downloadSpeedMbps"], 100.0);
        assert_eq!(json["uploadSpeedMbps"], 40.0);
        assert_eq!(json["pingMs"], 21.0);
        assert_eq!(json["jitterMs"], 1.2);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_report_flattens_result() {
        let result = SpeedTestResult::new(100.0, 40.0, 21.0, 1.2);
        let json = serde_json::to_value(ResultReport::new(&result)).unwrap();

        assert_eq!(json["downloadSpeedMbps"], 100.0);
        assert!(json["rating"]["overall"].is_string());
    }

    #[test]
    fn test_summary_text_uses_labels() {
        let result = SpeedTestResult::new(100.0, 40.24, 21.0, 1.2);
        let labels = Labels {
            download: "Herunterladen".into(),
            ..Labels::default()
        };

        let text = result.summary_text(&labels);

        assert_eq!(
            text,
            "Herunterladen: 100.0 Mbps\nUpload: 40.2 Mbps\n\
             Ping: 21 ms\nJitter: 1.2 ms"
        );
    }
}
