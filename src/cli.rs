use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "introduck", about = "Automatic loudness reduction for TV episode intros")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory containing preset files
    #[arg(long, global = true, default_value = "presets")]
    pub presets_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Duck the intro of one episode and write a processed copy
    Process(ProcessArgs),
    /// Run detection only and print the result; writes no file
    Analyze(AnalyzeArgs),
    /// Apply `process` to every recognized media file in a directory
    Batch(BatchArgs),
    /// Build a reference fingerprint from a hand-labeled episode interval
    Fingerprint(FingerprintArgs),
}

#[derive(Args, Debug)]
#[group(id = "source", required = true, multiple = true, args = ["preset", "fingerprint", "intro_start"])]
pub struct ProcessArgs {
    /// Input episode file
    pub input: PathBuf,

    /// Output file path (default: `<stem>.ducked<ext>` next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Preset name (resolved in the presets directory)
    #[arg(long)]
    pub preset: Option<String>,

    /// Reference fingerprint path (bypasses presets)
    #[arg(long, conflicts_with = "preset")]
    pub fingerprint: Option<PathBuf>,

    /// Manual intro start (HH:MM:SS.fff, MM:SS.fff, or seconds)
    #[arg(long, requires = "intro_end")]
    pub intro_start: Option<String>,

    /// Manual intro end (HH:MM:SS.fff, MM:SS.fff, or seconds)
    #[arg(long, requires = "intro_start")]
    pub intro_end: Option<String>,

    /// Fixed gain reduction in dB (negative)
    #[arg(long, allow_hyphen_values = true, conflicts_with = "target_intro_lufs")]
    pub duck_db: Option<f64>,

    /// Duck the intro to this integrated loudness instead of a fixed amount
    #[arg(long, allow_hyphen_values = true)]
    pub target_intro_lufs: Option<f64>,

    /// Fade duration in seconds at each edge of the duck
    #[arg(long)]
    pub fade: Option<f64>,

    /// Write a JSON report next to the output file
    #[arg(long)]
    pub report_json: bool,

    /// Run analysis and planning only; write no output file
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
#[group(id = "reference", required = true, multiple = false, args = ["preset", "fingerprint"])]
pub struct AnalyzeArgs {
    /// Input episode file
    pub input: PathBuf,

    /// Preset name (resolved in the presets directory)
    #[arg(long)]
    pub preset: Option<String>,

    /// Reference fingerprint path (bypasses presets)
    #[arg(long)]
    pub fingerprint: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Directory containing episodes
    pub input_dir: PathBuf,

    /// Preset name applied to every file
    #[arg(long)]
    pub preset: String,

    /// Recurse into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Fixed gain reduction in dB (overrides the preset)
    #[arg(long, allow_hyphen_values = true)]
    pub duck_db: Option<f64>,

    /// Fade duration in seconds (overrides the preset)
    #[arg(long)]
    pub fade: Option<f64>,

    /// Treat a failed detection as a per-item failure instead of a skip
    #[arg(long)]
    pub require_match: bool,
}

#[derive(Args, Debug)]
pub struct FingerprintArgs {
    /// Episode file containing the labeled intro
    pub input: PathBuf,

    /// Intro start in the reference episode (HH:MM:SS.fff, MM:SS.fff, or seconds)
    #[arg(long)]
    pub intro_start: String,

    /// Intro end in the reference episode
    #[arg(long)]
    pub intro_end: String,

    /// Where to save the fingerprint
    #[arg(short, long)]
    pub output: PathBuf,

    /// Free-form label stored in the fingerprint
    #[arg(long, default_value = "")]
    pub label: String,
}

/// Parse `HH:MM:SS.fff`, `MM:SS.fff`, or plain seconds into seconds.
///
/// Negative values and malformed fields are rejected.
pub fn parse_timecode(s: &str) -> Result<f64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty timecode".into());
    }

    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() > 3 {
        return Err(format!("too many ':' separators in '{s}'"));
    }

    let mut seconds = 0.0f64;
    for part in &parts {
        let value: f64 = part
            .parse()
            .map_err(|_| format!("invalid timecode field '{part}' in '{s}'"))?;
        if value < 0.0 || !value.is_finite() {
            return Err(format!("negative or non-finite timecode '{s}'"));
        }
        seconds = seconds * 60.0 + value;
    }

    Ok(seconds)
}
