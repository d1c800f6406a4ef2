use serde::Deserialize;
use std::path::Path;
use std::process::Command;

use crate::error::ProcessError;
use crate::proc;

/// One audio stream as reported by the prober.
#[derive(Debug, Clone)]
pub struct AudioStreamInfo {
    /// Absolute stream index inside the container.
    pub index: usize,
    pub codec_name: String,
    pub channels: usize,
    pub sample_rate: u32,
    pub bit_rate: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub duration: f64,
    pub audio_streams: Vec<AudioStreamInfo>,
    pub has_video: bool,
    pub has_subtitles: bool,
}

impl MediaInfo {
    /// The stream analysis and rendering operate on: the first audio stream.
    pub fn default_audio(&self, path: &Path) -> Result<&AudioStreamInfo, ProcessError> {
        self.audio_streams.first().ok_or_else(|| ProcessError::Decode {
            path: path.to_path_buf(),
            reason: "no audio stream".into(),
        })
    }
}

#[derive(Deserialize)]
struct ProbeDocument {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    channels: Option<usize>,
    sample_rate: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

pub fn probe(path: &Path) -> Result<MediaInfo, ProcessError> {
    let mut cmd = Command::new("ffprobe");
    cmd.args([
        "-v",
        "error",
        "-show_entries",
        "stream=index,codec_type,codec_name,channels,sample_rate,bit_rate",
        "-show_entries",
        "format=duration",
        "-of",
        "json",
    ])
    .arg(path);

    let out = proc::run_with_timeout("prober", cmd, proc::DECODER_TIMEOUT)?;
    if !out.success() {
        return Err(ProcessError::Decode {
            path: path.to_path_buf(),
            reason: proc::summarize_stderr(&out.stderr),
        });
    }

    let json = String::from_utf8_lossy(&out.stdout);
    parse_probe(&json).map_err(|reason| ProcessError::Decode {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse_probe(json: &str) -> Result<MediaInfo, String> {
    let doc: ProbeDocument =
        serde_json::from_str(json).map_err(|e| format!("unreadable probe output: {e}"))?;

    let duration = doc
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| "container reports no duration".to_string())?;

    let mut audio_streams = Vec::new();
    let mut has_video = false;
    let mut has_subtitles = false;

    for stream in doc.streams {
        match stream.codec_type.as_deref() {
            Some("audio") => {
                let sample_rate = stream
                    .sample_rate
                    .as_deref()
                    .and_then(|r| r.parse::<u32>().ok())
                    .filter(|&r| r > 0)
                    .ok_or_else(|| format!("audio stream {} reports no sample rate", stream.index))?;
                audio_streams.push(AudioStreamInfo {
                    index: stream.index,
                    codec_name: stream.codec_name.unwrap_or_else(|| "unknown".into()),
                    channels: stream.channels.unwrap_or(1).max(1),
                    sample_rate,
                    bit_rate: stream.bit_rate.and_then(|b| b.parse().ok()),
                });
            }
            Some("video") => has_video = true,
            Some("subtitle") => has_subtitles = true,
            _ => {}
        }
    }

    Ok(MediaInfo {
        duration,
        audio_streams,
        has_video,
        has_subtitles,
    })
}
