use serde::Serialize;
use std::path::Path;

use crate::error::ProcessError;

/// JSON report written next to the rendered file on request.
#[derive(Debug, Serialize)]
pub struct Report {
    pub input: String,
    pub output: Option<String>,
    pub detected: DetectedInterval,
    pub loudness: LoudnessInfo,
    /// Envelope breakpoints as `[t_seconds, gain_db]` pairs.
    pub envelope: Vec<[f64; 2]>,
    pub duration_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct DetectedInterval {
    pub start: f64,
    pub end: f64,
    pub score: f64,
    pub source: DetectionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Fingerprint,
    Manual,
}

/// Loudness readings; `null` marks an interval too short to gate.
#[derive(Debug, Serialize)]
pub struct LoudnessInfo {
    pub episode_lufs: Option<f64>,
    pub intro_lufs_before: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro_lufs_after: Option<f64>,
}

impl Report {
    pub fn save(&self, path: &Path) -> Result<(), ProcessError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ProcessError::Io(std::io::Error::other(e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
