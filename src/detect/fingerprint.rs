use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::audio::features::{self, FeatureMatrix};
use crate::audio::ingest::PcmBuffer;
use crate::config::AnalysisConfig;
use crate::error::ProcessError;

/// A reference intro fingerprint: the normalized feature matrix of a
/// hand-labeled intro plus the extraction parameters it was built with.
///
/// Immutable after load; batch workers share references freely.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub features: FeatureMatrix,
    pub sample_rate: u32,
    pub hop_length: usize,
    pub window_length: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub label: String,
}

/// On-disk container: named arrays and scalars in one JSON document.
#[derive(Serialize, Deserialize)]
struct FingerprintFile {
    features: Vec<Vec<f32>>,
    sample_rate: u32,
    hop_length: usize,
    window_length: usize,
    n_mfcc: usize,
    start_time: f32,
    end_time: f32,
    label: String,
}

impl Fingerprint {
    /// Build a fingerprint from the labeled interval of a reference episode.
    pub fn build(
        pcm: &PcmBuffer,
        start_time: f64,
        end_time: f64,
        label: &str,
        cfg: &AnalysisConfig,
    ) -> Result<Self, ProcessError> {
        if start_time < 0.0 || end_time <= start_time {
            return Err(ProcessError::InvalidInterval(format!(
                "reference interval {start_time:.2}..{end_time:.2} is not ordered"
            )));
        }
        if end_time > pcm.duration_seconds() + 1e-6 {
            return Err(ProcessError::InvalidInterval(format!(
                "reference interval ends at {end_time:.2}s but the episode is {:.2}s",
                pcm.duration_seconds()
            )));
        }

        let segment = PcmBuffer {
            samples: pcm.slice_seconds(start_time, end_time).to_vec(),
            sample_rate: pcm.sample_rate,
        };
        let features = features::extract(&segment, cfg);
        if features.n_frames() == 0 {
            return Err(ProcessError::FingerprintEmpty);
        }

        Ok(Self {
            features,
            sample_rate: cfg.sample_rate,
            hop_length: cfg.hop_samples(),
            window_length: cfg.window_samples(),
            start_time,
            end_time,
            label: label.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ProcessError> {
        let file = FingerprintFile {
            features: self.features.rows().map(|r| r.to_vec()).collect(),
            sample_rate: self.sample_rate,
            hop_length: self.hop_length,
            window_length: self.window_length,
            n_mfcc: self.features.dim(),
            start_time: self.start_time as f32,
            end_time: self.end_time as f32,
            label: self.label.clone(),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &file)
            .map_err(|e| ProcessError::Io(std::io::Error::other(e)))?;
        Ok(())
    }

    /// Load a fingerprint and check it against the active extractor
    /// parameters; a mismatched reference cannot be compared and is fatal.
    pub fn load(path: &Path, cfg: &AnalysisConfig) -> Result<Self, ProcessError> {
        let reader = BufReader::new(File::open(path)?);
        let file: FingerprintFile = serde_json::from_reader(reader).map_err(|e| {
            ProcessError::FingerprintIncompatible(format!(
                "malformed container {}: {e}",
                path.display()
            ))
        })?;

        if file.sample_rate != cfg.sample_rate {
            return Err(ProcessError::FingerprintIncompatible(format!(
                "sample rate {} != extractor {}",
                file.sample_rate, cfg.sample_rate
            )));
        }
        if file.n_mfcc != cfg.n_mfcc {
            return Err(ProcessError::FingerprintIncompatible(format!(
                "{} coefficients != extractor {}",
                file.n_mfcc, cfg.n_mfcc
            )));
        }
        if file.hop_length != cfg.hop_samples() {
            return Err(ProcessError::FingerprintIncompatible(format!(
                "hop {} != extractor {}",
                file.hop_length,
                cfg.hop_samples()
            )));
        }

        let n_frames = file.features.len();
        let mut data = Vec::with_capacity(n_frames * file.n_mfcc);
        for row in &file.features {
            if row.len() != file.n_mfcc {
                return Err(ProcessError::FingerprintIncompatible(format!(
                    "row of {} values in a {}-dim matrix",
                    row.len(),
                    file.n_mfcc
                )));
            }
            data.extend_from_slice(row);
        }
        let features = FeatureMatrix::from_vec(data, n_frames, file.n_mfcc)
            .map_err(ProcessError::FingerprintIncompatible)?;

        Ok(Self {
            features,
            sample_rate: file.sample_rate,
            hop_length: file.hop_length,
            window_length: file.window_length,
            start_time: file.start_time as f64,
            end_time: file.end_time as f64,
            label: file.label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pcm(seconds: f64, cfg: &AnalysisConfig) -> PcmBuffer {
        let n = (seconds * cfg.sample_rate as f64) as usize;
        let samples = (0..n)
            .map(|i| {
                let t = i as f32 / cfg.sample_rate as f32;
                0.3 * (2.0 * std::f32::consts::PI * (300.0 + 80.0 * t) * t).sin()
            })
            .collect();
        PcmBuffer {
            samples,
            sample_rate: cfg.sample_rate,
        }
    }

    #[test]
    fn build_covers_the_labeled_interval() {
        let cfg = AnalysisConfig::default();
        let pcm = test_pcm(12.0, &cfg);
        let fp = Fingerprint::build(&pcm, 2.0, 7.0, "test show", &cfg).unwrap();

        // Frame count within one hop of the interval duration.
        let expected = (5.0 / cfg.hop_seconds()).round();
        let got = fp.features.n_frames() as f64;
        assert!((got - expected).abs() <= 1.0, "{got} vs {expected}");
        assert_eq!(fp.sample_rate, 22050);
        assert_eq!(fp.hop_length, 441);
    }

    #[test]
    fn build_rejects_unordered_interval() {
        let cfg = AnalysisConfig::default();
        let pcm = test_pcm(12.0, &cfg);
        assert!(matches!(
            Fingerprint::build(&pcm, 7.0, 2.0, "", &cfg),
            Err(ProcessError::InvalidInterval(_))
        ));
        assert!(matches!(
            Fingerprint::build(&pcm, 2.0, 100.0, "", &cfg),
            Err(ProcessError::InvalidInterval(_))
        ));
    }

    #[test]
    fn save_load_round_trip() {
        let cfg = AnalysisConfig::default();
        let pcm = test_pcm(12.0, &cfg);
        let fp = Fingerprint::build(&pcm, 2.0, 7.0, "round trip", &cfg).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show.fp.json");
        fp.save(&path).unwrap();

        let loaded = Fingerprint::load(&path, &cfg).unwrap();
        assert_eq!(loaded.features, fp.features);
        assert_eq!(loaded.label, "round trip");
        assert!((loaded.start_time - 2.0).abs() < 1e-5);
        assert!((loaded.end_time - 7.0).abs() < 1e-5);
    }

    #[test]
    fn load_rejects_mismatched_parameters() {
        let cfg = AnalysisConfig::default();
        let pcm = test_pcm(12.0, &cfg);
        let fp = Fingerprint::build(&pcm, 2.0, 7.0, "", &cfg).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show.fp.json");
        fp.save(&path).unwrap();

        let other = AnalysisConfig {
            sample_rate: 16000,
            ..cfg
        };
        assert!(matches!(
            Fingerprint::load(&path, &other),
            Err(ProcessError::FingerprintIncompatible(_))
        ));

        let other = AnalysisConfig { n_mfcc: 13, ..cfg };
        assert!(matches!(
            Fingerprint::load(&path, &other),
            Err(ProcessError::FingerprintIncompatible(_))
        ));
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.fp.json");
        std::fs::write(&path, "not a fingerprint").unwrap();
        assert!(matches!(
            Fingerprint::load(&path, &AnalysisConfig::default()),
            Err(ProcessError::FingerprintIncompatible(_))
        ));
    }
}
