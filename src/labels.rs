//! Display strings supplied by the host.
//!
//! Every user-visible word the engine produces comes from [`Labels`]. The
//! defaults are English; a JSON file can override any subset of them.

use crate::errors::SpeedTestError;
use crate::progress::Phase;
use crate::rating::QualityScore;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Labels {
    pub ping: String,
    pub jitter: String,
    pub download: String,
    pub upload: String,
    pub speed_unit: String,
    pub latency_unit: String,
    pub idle: String,
    pub complete: String,
    pub copied: String,
    pub shared: String,
    pub history: String,
    pub rating: String,
    pub streaming: String,
    pub gaming: String,
    pub video_conferencing: String,
    pub poor: String,
    pub average: String,
    pub good: String,
    pub great: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            ping: "Ping".into(),
            jitter: "Jitter".into(),
            download: "Download".into(),
            upload: "Upload".into(),
            speed_unit: "Mbps".into(),
            latency_unit: "ms".into(),
            idle: "Ready".into(),
            complete: "Complete".into(),
            copied: "Copied to clipboard".into(),
            shared: "Shared".into(),
            history: "History".into(),
            rating: "Rating".into(),
            streaming: "Streaming".into(),
            gaming: "Gaming".into(),
            video_conferencing: "Video calls".into(),
            poor: "Poor".into(),
            average: "Average".into(),
            good: "Good".into(),
            great: "Great".into(),
        }
    }
}

impl Labels {
    /// Parse a JSON object; keys that are absent keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, SpeedTestError> {
        serde_json::from_str(json).map_err(|e| {
            SpeedTestError::config(format!("invalid labels file: {}", e))
        })
    }

    pub fn load(path: &Path) -> Result<Self, SpeedTestError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            SpeedTestError::config(format!(
                "cannot read labels file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&json)
    }

    pub fn phase(&self, phase: Phase) -> &str {
        match phase {
            Phase::Idle => &self.idle,
            Phase::Ping => &self.ping,
            Phase::Download => &self.download,
            Phase::Upload => &self.upload,
            Phase::Complete => &self.complete,
        }
    }

    pub fn score(&self, score: QualityScore) -> &str {
        match score {
            QualityScore::Poor => &self.poor,
            QualityScore::Average => &self.average,
            QualityScore::Good => &self.good,
            QualityScore::Great => &self.great,
        }
    }
}
