//! Connection quality rating.
//!
//! Classifies a completed result for three use cases (streaming, gaming,
//! video conferencing) from download, upload, ping and jitter. The overall
//! rating is the worst of the three.

use crate::results::SpeedTestResult;
use serde::Serialize;

/// Quality score categories for network performance.
///
/// Variants are ordered from worst to best for correct derived Ord behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityScore {
    /// Likely to experience significant issues
    Poor,
    /// May experience occasional issues
    Average,
    /// Suitable for the use case
    Good,
    /// Optimal for the use case
    Great,
}

/// Quality scores per use case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub streaming: QualityScore,
    pub gaming: QualityScore,
    pub video_conferencing: QualityScore,
    pub overall: QualityScore,
}

impl Rating {
    pub fn new(
        streaming: QualityScore,
        gaming: QualityScore,
        video_conferencing: QualityScore,
    ) -> Self {
        let overall = streaming.min(gaming).min(video_conferencing);
        Self { streaming, gaming, video_conferencing, overall }
    }
}

/// Minimum speeds (Mbps) for Great, Good and Average.
type SpeedThresholds = [f64; 3];

/// Maximum delays (ms) for Great, Good and Average.
type DelayThresholds = [f64; 3];

mod streaming_thresholds {
    pub const DOWNLOAD: super::SpeedThresholds = [25.0, 10.0, 5.0];
    pub const LATENCY: super::DelayThresholds = [100.0, 200.0, 400.0];
}

mod gaming_thresholds {
    pub const DOWNLOAD: super::SpeedThresholds = [15.0, 5.0, 3.0];
    pub const LATENCY: super::DelayThresholds = [30.0, 50.0, 100.0];
    pub const JITTER: super::DelayThresholds = [10.0, 20.0, 30.0];
}

mod video_conferencing_thresholds {
    pub const DOWNLOAD: super::SpeedThresholds = [10.0, 5.0, 2.0];
    pub const UPLOAD: super::SpeedThresholds = [10.0, 5.0, 2.0];
    pub const LATENCY: super::DelayThresholds = [50.0, 100.0, 200.0];
    pub const JITTER: super::DelayThresholds = [15.0, 30.0, 50.0];
}

fn score_speed(
    value: f64,
    [great, good, average]: SpeedThresholds,
) -> QualityScore {
    if value >= great {
        QualityScore::Great
    } else if value >= good {
        QualityScore::Good
    } else if value >= average {
        QualityScore::Average
    } else {
        QualityScore::Poor
    }
}

fn score_delay(
    value: f64,
    [great, good, average]: DelayThresholds,
) -> QualityScore {
    if value <= great {
        QualityScore::Great
    } else if value <= good {
        QualityScore::Good
    } else if value <= average {
        QualityScore::Average
    } else {
        QualityScore::Poor
    }
}

/// Rate a completed result.
///
/// Better inputs never lower any score.
pub fn rate(result: &SpeedTestResult) -> Rating {
    Rating::new(
        streaming_score(result),
        gaming_score(result),
        video_conferencing_score(result),
    )
}

/// Download speed first, latency second.
fn streaming_score(result: &SpeedTestResult) -> QualityScore {
    use streaming_thresholds::*;

    score_speed(result.download_speed_mbps, DOWNLOAD)
        .min(score_delay(result.ping_ms, LATENCY))
}

/// Latency and jitter dominate; download still has to keep up.
fn gaming_score(result: &SpeedTestResult) -> QualityScore {
    use gaming_thresholds::*;

    [
        score_delay(result.ping_ms, LATENCY),
        score_delay(result.jitter_ms, JITTER),
        score_speed(result.download_speed_mbps, DOWNLOAD),
    ]
    .into_iter()
    .min()
    .unwrap_or(QualityScore::Poor)
}

/// Two-way traffic: both directions, latency and jitter.
fn video_conferencing_score(result: &SpeedTestResult) -> QualityScore {
    use video_conferencing_thresholds::*;

    [
        score_speed(result.download_speed_mbps, DOWNLOAD),
        score_speed(result.upload_speed_mbps, UPLOAD),
        score_delay(result.ping_ms, LATENCY),
        score_delay(result.jitter_ms, JITTER),
    ]
    .into_iter()
    .min()
    .unwrap_or(QualityScore::Poor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn result(down: f64, up: f64, ping: f64, jitter: f64) -> SpeedTestResult {
        SpeedTestResult {
            download_speed_mbps: down,
            upload_speed_mbps: up,
            ping_ms: ping,
            jitter_ms: jitter,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_quality_score_ordering() {
        assert!(QualityScore::Great > QualityScore::Good);
        assert!(QualityScore::Good > QualityScore::Average);
        assert!(QualityScore::Average > QualityScore::Poor);
    }

    #[test]
    fn test_fast_connection_is_great() {
        let rating = rate(&result(300.0, 50.0, 12.0, 1.5));

        assert_eq!(rating.streaming, QualityScore::Great);
        assert_eq!(rating.gaming, QualityScore::Great);
        assert_eq!(rating.video_conferencing, QualityScore::Great);
        assert_eq!(rating.overall, QualityScore::Great);
    }

    #[test]
    fn test_high_latency_hurts_gaming_first() {
        let rating = rate(&result(300.0, 50.0, 80.0, 5.0));

        assert_eq!(rating.streaming, QualityScore::Great);
        assert_eq!(rating.gaming, QualityScore::Average);
        assert_eq!(rating.video_conferencing, QualityScore::Good);
        assert_eq!(rating.overall, QualityScore::Average);
    }

    #[test]
    fn test_zero_upload_is_poor_for_calls() {
        let rating = rate(&result(100.0, 0.0, 20.0, 2.0));

        assert_eq!(rating.video_conferencing, QualityScore::Poor);
        assert_eq!(rating.overall, QualityScore::Poor);
    }

    #[test]
    fn test_rating_serializes_lowercase() {
        let json =
            serde_json::to_value(rate(&result(300.0, 50.0, 12.0, 1.5)))
                .unwrap();
        assert_eq!(json["videoConferencing"], "great");
        assert_eq!(json["overall"], "great");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn faster_speeds_never_lower_the_rating(
            down in 0.0f64..500.0,
            up in 0.0f64..100.0,
            ping in 0.0f64..500.0,
            jitter in 0.0f64..100.0,
            extra in 0.0f64..100.0,
        ) {
            let base = rate(&result(down, up, ping, jitter));
            let faster =
                rate(&result(down + extra, up + extra, ping, jitter));
            let snappier =
                rate(&result(down, up, (ping - extra).max(0.0), jitter));

            prop_assert!(faster.overall >= base.overall);
            prop_assert!(snappier.overall >= base.overall);
        }
    }
}
