use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Feature extraction parameters.
///
/// Passed by value into each request so parallel batch workers never share
/// mutable analysis state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisConfig {
    /// Analysis sample rate in Hz.
    pub sample_rate: u32,
    /// Analysis window length in milliseconds.
    pub window_ms: f32,
    /// Hop between consecutive frames in milliseconds.
    pub hop_ms: f32,
    /// Number of mel filter bank bands.
    pub n_mels: usize,
    /// Number of cepstral coefficients kept per frame.
    pub n_mfcc: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            window_ms: 25.0,
            hop_ms: 20.0,
            n_mels: 40,
            n_mfcc: 20,
        }
    }
}

impl AnalysisConfig {
    pub fn window_samples(&self) -> usize {
        (self.sample_rate as f32 * self.window_ms / 1000.0).round() as usize
    }

    pub fn hop_samples(&self) -> usize {
        (self.sample_rate as f32 * self.hop_ms / 1000.0).round() as usize
    }

    pub fn hop_seconds(&self) -> f64 {
        self.hop_samples() as f64 / self.sample_rate as f64
    }
}

/// Two-pass matcher parameters.
#[derive(Debug, Clone, Copy)]
pub struct MatchConfig {
    /// Coarse pass evaluates every `stride`-th offset.
    pub stride: usize,
    /// Number of coarse candidates carried into the refine pass.
    pub top_k: usize,
    /// Acceptance threshold on the [0, 1] confidence scale.
    pub min_score: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            stride: 25,
            top_k: 8,
            min_score: 0.55,
        }
    }
}

/// Per-show preset loaded from `<presets_dir>/<name>.toml`.
#[derive(Debug, Deserialize)]
pub struct Preset {
    /// Reference fingerprint path; relative paths resolve against the
    /// preset directory.
    pub fingerprint: PathBuf,
    #[serde(default = "default_duck_db")]
    pub duck_db: f64,
    #[serde(default = "default_fade_seconds")]
    pub fade_seconds: f64,
    #[serde(default)]
    pub target_lufs: Option<f64>,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

fn default_duck_db() -> f64 {
    -9.0
}

fn default_fade_seconds() -> f64 {
    0.12
}

fn default_min_score() -> f64 {
    0.55
}

pub fn load_preset(name: &str, presets_dir: &Path) -> Result<Preset> {
    let path = presets_dir.join(format!("{name}.toml"));
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read preset: {}", path.display()))?;
    let mut preset: Preset = toml::from_str(&content)
        .with_context(|| format!("Failed to parse preset: {}", path.display()))?;
    if preset.fingerprint.is_relative() {
        preset.fingerprint = presets_dir.join(&preset.fingerprint);
    }
    Ok(preset)
}
