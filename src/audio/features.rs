use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::ingest::PcmBuffer;
use crate::config::AnalysisConfig;

/// Frame-major feature matrix: `n_frames` rows of `dim` coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Vec<f32>,
    n_frames: usize,
    dim: usize,
}

impl FeatureMatrix {
    pub fn from_vec(data: Vec<f32>, n_frames: usize, dim: usize) -> Result<Self, String> {
        if data.len() != n_frames * dim {
            return Err(format!(
                "feature matrix shape mismatch: {} values for {}x{}",
                data.len(),
                n_frames,
                dim
            ));
        }
        Ok(Self {
            data,
            n_frames,
            dim,
        })
    }

    pub fn empty(dim: usize) -> Self {
        Self {
            data: Vec::new(),
            n_frames: 0,
            dim,
        }
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn row(&self, frame: usize) -> &[f32] {
        &self.data[frame * self.dim..(frame + 1) * self.dim]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim)
    }
}

/// Extract MFCC features: Hann window, power spectrum, mel filter bank,
/// log compression, DCT-II, then per-column z-normalization across time.
///
/// Normalizing each coefficient makes frame correlation scores invariant
/// to per-episode mastering gain.
pub fn extract(pcm: &PcmBuffer, cfg: &AnalysisConfig) -> FeatureMatrix {
    let window = cfg.window_samples();
    let hop = cfg.hop_samples();
    let samples = &pcm.samples;

    if samples.len() < window {
        return FeatureMatrix::empty(cfg.n_mfcc);
    }
    let n_frames = (samples.len() - window) / hop + 1;

    let fft_size = window.next_power_of_two();
    let hann = hann_window(window);
    let mel_bank = mel_filter_bank(cfg.n_mels, fft_size, cfg.sample_rate);
    let dct = dct_matrix(cfg.n_mfcc, cfg.n_mels);

    log::debug!(
        "Extracting {} frames (window={}, hop={}, fft={})",
        n_frames,
        window,
        hop,
        fft_size
    );

    let rows: Vec<Vec<f32>> = (0..n_frames)
        .into_par_iter()
        .map(|frame_idx| {
            let start = frame_idx * hop;

            // Per-thread FFT planner (rayon-safe)
            let mut planner = FftPlanner::<f32>::new();
            let fft = planner.plan_fft_forward(fft_size);

            let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); fft_size];
            for i in 0..window {
                buffer[i] = Complex::new(samples[start + i] * hann[i], 0.0);
            }
            fft.process(&mut buffer);

            let n_bins = fft_size / 2 + 1;
            let power: Vec<f32> = buffer[..n_bins].iter().map(|c| c.norm_sqr()).collect();

            let log_mel: Vec<f32> = mel_bank
                .iter()
                .map(|filter| {
                    let energy: f32 = filter
                        .iter()
                        .zip(power.iter())
                        .map(|(w, p)| w * p)
                        .sum();
                    energy.max(1e-10).ln()
                })
                .collect();

            dct.chunks_exact(cfg.n_mels)
                .map(|basis| {
                    basis
                        .iter()
                        .zip(log_mel.iter())
                        .map(|(b, m)| b * m)
                        .sum()
                })
                .collect()
        })
        .collect();

    let mut data = Vec::with_capacity(n_frames * cfg.n_mfcc);
    for row in rows {
        data.extend_from_slice(&row);
    }

    let mut matrix = FeatureMatrix {
        data,
        n_frames,
        dim: cfg.n_mfcc,
    };
    z_normalize_columns(&mut matrix);
    matrix
}

/// Z-normalize every column across time; a near-constant column keeps a
/// stddev of 1.0 so it maps to all zeros instead of blowing up.
fn z_normalize_columns(matrix: &mut FeatureMatrix) {
    let n = matrix.n_frames;
    if n == 0 {
        return;
    }
    let dim = matrix.dim;

    for col in 0..dim {
        let mut mean = 0.0f64;
        for frame in 0..n {
            mean += matrix.data[frame * dim + col] as f64;
        }
        mean /= n as f64;

        let mut var = 0.0f64;
        for frame in 0..n {
            let d = matrix.data[frame * dim + col] as f64 - mean;
            var += d * d;
        }
        let mut std = (var / n as f64).sqrt();
        if std < 1e-6 {
            std = 1.0;
        }

        for frame in 0..n {
            let v = &mut matrix.data[frame * dim + col];
            *v = ((*v as f64 - mean) / std) as f32;
        }
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filters over `[0, sample_rate/2]`, one dense row of
/// weights per band covering the `fft_size/2 + 1` spectrum bins.
fn mel_filter_bank(n_mels: usize, fft_size: usize, sample_rate: u32) -> Vec<Vec<f32>> {
    let n_bins = fft_size / 2 + 1;
    let nyquist = sample_rate as f32 / 2.0;
    let max_mel = hz_to_mel(nyquist);

    // n_mels + 2 equally spaced mel points define the triangle edges.
    let hz_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f32 / (n_mels + 1) as f32))
        .collect();
    let bin_of = |hz: f32| hz * fft_size as f32 / sample_rate as f32;

    let mut bank = Vec::with_capacity(n_mels);
    for m in 0..n_mels {
        let left = bin_of(hz_points[m]);
        let center = bin_of(hz_points[m + 1]);
        let right = bin_of(hz_points[m + 2]);

        let mut filter = vec![0.0f32; n_bins];
        for (bin, weight) in filter.iter_mut().enumerate() {
            let b = bin as f32;
            if b > left && b < center {
                *weight = (b - left) / (center - left);
            } else if b >= center && b < right {
                *weight = (right - b) / (right - center);
            }
        }
        bank.push(filter);
    }
    bank
}

/// Orthonormal DCT-II basis, `n_mfcc` rows by `n_mels` columns.
fn dct_matrix(n_mfcc: usize, n_mels: usize) -> Vec<f32> {
    let mut m = Vec::with_capacity(n_mfcc * n_mels);
    let norm0 = (1.0 / n_mels as f32).sqrt();
    let norm = (2.0 / n_mels as f32).sqrt();
    for k in 0..n_mfcc {
        let scale = if k == 0 { norm0 } else { norm };
        for n in 0..n_mels {
            let angle =
                std::f32::consts::PI * k as f32 * (2.0 * n as f32 + 1.0) / (2.0 * n_mels as f32);
            m.push(scale * angle.cos());
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, seconds: f32, sample_rate: u32) -> PcmBuffer {
        let n = (seconds * sample_rate as f32) as usize;
        let samples = (0..n)
            .map(|i| {
                0.4 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
            })
            .collect();
        PcmBuffer {
            samples,
            sample_rate,
        }
    }

    #[test]
    fn frame_count_follows_hop_geometry() {
        let cfg = AnalysisConfig::default();
        let pcm = tone(440.0, 2.0, cfg.sample_rate);
        let feats = extract(&pcm, &cfg);

        let expected = (pcm.samples.len() - cfg.window_samples()) / cfg.hop_samples() + 1;
        assert_eq!(feats.n_frames(), expected);
        assert_eq!(feats.dim(), cfg.n_mfcc);
    }

    #[test]
    fn too_short_input_yields_empty_matrix() {
        let cfg = AnalysisConfig::default();
        let pcm = PcmBuffer {
            samples: vec![0.0; cfg.window_samples() - 1],
            sample_rate: cfg.sample_rate,
        };
        let feats = extract(&pcm, &cfg);
        assert_eq!(feats.n_frames(), 0);
        assert_eq!(feats.dim(), cfg.n_mfcc);
    }

    #[test]
    fn extraction_is_deterministic() {
        let cfg = AnalysisConfig::default();
        let pcm = tone(523.25, 1.0, cfg.sample_rate);
        let a = extract(&pcm, &cfg);
        let b = extract(&pcm, &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn columns_are_z_normalized() {
        let cfg = AnalysisConfig::default();
        // A chirp-ish mix so columns actually vary over time.
        let n = (3.0 * cfg.sample_rate as f32) as usize;
        let samples: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f32 / cfg.sample_rate as f32;
                0.3 * (2.0 * std::f32::consts::PI * (200.0 + 400.0 * t) * t).sin()
            })
            .collect();
        let pcm = PcmBuffer {
            samples,
            sample_rate: cfg.sample_rate,
        };

        let feats = extract(&pcm, &cfg);
        let frames = feats.n_frames() as f64;
        for col in 0..feats.dim() {
            let mut mean = 0.0f64;
            for frame in 0..feats.n_frames() {
                mean += feats.row(frame)[col] as f64;
            }
            mean /= frames;

            let mut var = 0.0f64;
            for frame in 0..feats.n_frames() {
                let d = feats.row(frame)[col] as f64 - mean;
                var += d * d;
            }
            let std = (var / frames).sqrt();

            assert!(mean.abs() < 1e-3, "column {col} mean {mean}");
            assert!(
                (std - 1.0).abs() < 1e-3 || std.abs() < 1e-3,
                "column {col} std {std}"
            );
        }
    }

    #[test]
    fn constant_signal_maps_to_zero_columns() {
        let cfg = AnalysisConfig::default();
        let pcm = PcmBuffer {
            samples: vec![0.1; cfg.sample_rate as usize],
            sample_rate: cfg.sample_rate,
        };
        let feats = extract(&pcm, &cfg);
        assert!(feats.n_frames() > 0);
        for row in feats.rows() {
            for &v in row {
                assert!(v.abs() < 1e-3);
            }
        }
    }

    #[test]
    fn from_vec_rejects_shape_mismatch() {
        assert!(FeatureMatrix::from_vec(vec![0.0; 10], 3, 4).is_err());
        assert!(FeatureMatrix::from_vec(vec![0.0; 12], 3, 4).is_ok());
    }
}
