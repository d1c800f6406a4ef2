use std::path::Path;
use std::process::Command;

use crate::error::ProcessError;
use crate::gain::filtergraph::RenderPlan;
use crate::media::AudioStreamInfo;
use crate::proc;

/// Render the episode with the ducked audio stream.
///
/// Video and subtitle streams are stream-copied; only audio passes through
/// the filter and is re-encoded. A failed or timed-out render removes the
/// partial output before surfacing the error.
pub fn render(
    input: &Path,
    output: &Path,
    plan: &RenderPlan,
    audio: &AudioStreamInfo,
) -> Result<(), ProcessError> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-y", "-nostdin", "-v", "error", "-i"]).arg(input);

    if plan.copy_video {
        cmd.args(["-map", "0:v?", "-c:v", "copy"]);
    }

    cmd.arg("-map")
        .arg(format!("0:{}", audio.index))
        .arg("-af")
        .arg(&plan.audio_filter);
    for arg in audio_codec_args(audio) {
        cmd.arg(arg);
    }

    if plan.copy_subtitles {
        cmd.args(["-map", "0:s?", "-c:s", "copy"]);
    }

    cmd.arg(output);

    log::info!("Rendering {} -> {}", input.display(), output.display());
    let result = proc::run_with_timeout("renderer", cmd, proc::RENDERER_TIMEOUT);

    match result {
        Ok(out) if out.success() => Ok(()),
        Ok(out) => {
            remove_partial(output);
            Err(ProcessError::Renderer(proc::summarize_stderr(&out.stderr)))
        }
        Err(err) => {
            remove_partial(output);
            Err(err)
        }
    }
}

fn remove_partial(output: &Path) {
    if output.exists() {
        if let Err(e) = std::fs::remove_file(output) {
            log::warn!("Could not remove partial output {}: {e}", output.display());
        }
    }
}

/// Pick the output audio codec from the source stream so quality survives
/// the forced re-encode.
fn audio_codec_args(stream: &AudioStreamInfo) -> Vec<String> {
    let source_kbps = stream.bit_rate.map(|b| b / 1000);
    let codec = stream.codec_name.as_str();

    match codec {
        "flac" | "pcm_s16le" | "pcm_s24le" | "pcm_s32le" | "pcm_f32le" => {
            // Lossless source stays lossless.
            svec(&["-c:a", "flac", "-compression_level", "5"])
        }
        "aac" | "ac3" | "eac3" => {
            let kbps = source_kbps.unwrap_or(320).max(192);
            vec![
                "-c:a".into(),
                codec.to_string(),
                "-b:a".into(),
                format!("{kbps}k"),
            ]
        }
        _ => svec(&["-c:a", "aac", "-b:a", "320k"]),
    }
}

fn svec(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(codec: &str, bit_rate: Option<u64>) -> AudioStreamInfo {
        AudioStreamInfo {
            index: 1,
            codec_name: codec.into(),
            channels: 2,
            sample_rate: 48000,
            bit_rate,
        }
    }

    #[test]
    fn lossless_sources_stay_lossless() {
        let args = audio_codec_args(&stream("flac", None));
        assert_eq!(args, svec(&["-c:a", "flac", "-compression_level", "5"]));
        let args = audio_codec_args(&stream("pcm_s24le", None));
        assert_eq!(args[1], "flac");
    }

    #[test]
    fn lossy_sources_keep_codec_and_floor_bitrate() {
        let args = audio_codec_args(&stream("ac3", Some(384_000)));
        assert_eq!(args, svec(&["-c:a", "ac3", "-b:a", "384k"]));

        let args = audio_codec_args(&stream("aac", Some(96_000)));
        assert_eq!(args, svec(&["-c:a", "aac", "-b:a", "192k"]));
    }

    #[test]
    fn unknown_sources_get_high_quality_aac() {
        let args = audio_codec_args(&stream("dts", None));
        assert_eq!(args, svec(&["-c:a", "aac", "-b:a", "320k"]));
    }
}
