use std::path::Path;
use std::process::Command;

use crate::error::ProcessError;
use crate::media::AudioStreamInfo;
use crate::proc;

/// Mono analysis PCM at a fixed rate.
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Samples covering `[start, end)` seconds, clamped to the buffer.
    pub fn slice_seconds(&self, start: f64, end: f64) -> &[f32] {
        let sr = self.sample_rate as f64;
        let a = ((start.max(0.0) * sr) as usize).min(self.samples.len());
        let b = ((end.max(0.0) * sr) as usize).min(self.samples.len());
        &self.samples[a..a.max(b)]
    }
}

/// Decode the episode's audio stream to mono PCM at `target_rate`.
///
/// The external decoder emits raw f32 at the stream's native rate and
/// channel count; downmix and resampling happen in-process so the analysis
/// path controls both.
pub fn ingest(
    path: &Path,
    stream: &AudioStreamInfo,
    target_rate: u32,
) -> Result<PcmBuffer, ProcessError> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-nostdin", "-i"])
        .arg(path)
        .arg("-map")
        .arg(format!("0:{}", stream.index))
        .args(["-f", "f32le", "-acodec", "pcm_f32le", "-"]);

    let out = proc::run_with_timeout("decoder", cmd, proc::DECODER_TIMEOUT)?;
    if !out.success() {
        return Err(ProcessError::Decode {
            path: path.to_path_buf(),
            reason: proc::summarize_stderr(&out.stderr),
        });
    }
    if out.stdout.is_empty() {
        return Err(ProcessError::Decode {
            path: path.to_path_buf(),
            reason: "decoder produced no audio".into(),
        });
    }

    let mono = downmix(&out.stdout, stream.channels);

    let samples = if stream.sample_rate != target_rate {
        resample(mono, stream.sample_rate, target_rate).map_err(|reason| ProcessError::Decode {
            path: path.to_path_buf(),
            reason,
        })?
    } else {
        mono
    };

    log::info!(
        "Decoded audio: {} samples, {}Hz, {:.1}s",
        samples.len(),
        target_rate,
        samples.len() as f64 / target_rate as f64
    );

    Ok(PcmBuffer {
        samples,
        sample_rate: target_rate,
    })
}

/// Equal-weight downmix of interleaved little-endian f32 frames to mono.
fn downmix(bytes: &[u8], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    let scale = 1.0 / channels as f32;
    let frame_bytes = channels * 4;
    let n_frames = bytes.len() / frame_bytes;

    let mut mono = Vec::with_capacity(n_frames);
    for frame in bytes.chunks_exact(frame_bytes) {
        let mut acc = 0.0f32;
        for sample in frame.chunks_exact(4) {
            acc += f32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]);
        }
        mono.push((acc * scale).clamp(-1.0, 1.0));
    }
    mono
}

/// Polyphase sinc resampling of mono audio between arbitrary rates.
fn resample(samples: Vec<f32>, from_rate: u32, to_rate: u32) -> Result<Vec<f32>, String> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
        WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| format!("failed to create resampler: {e}"))?;

    let input = vec![samples];
    let output = resampler
        .process(&input, None)
        .map_err(|e| format!("resampling failed: {e}"))?;

    Ok(output.into_iter().next().unwrap_or_default())
}
