mod audio;
mod batch;
mod cli;
mod config;
mod detect;
mod error;
mod gain;
mod media;
mod pipeline;
mod proc;
mod render;
mod report;

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};

use cli::{AnalyzeArgs, BatchArgs, Cli, Command, FingerprintArgs, ProcessArgs};
use config::{AnalysisConfig, MatchConfig, Preset};
use error::ProcessError;
use gain::envelope::GainMode;
use pipeline::RequestSettings;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // clap's native exit code disagrees with the documented
            // convention: help/version exit 0, bad arguments exit 3.
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 3 } else { 0 });
        }
    };

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err:#}");
            err.downcast_ref::<ProcessError>()
                .map(ProcessError::exit_code)
                .unwrap_or(1)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Process(args) => run_process(args, &cli.presets_dir),
        Command::Analyze(args) => run_analyze(args, &cli.presets_dir),
        Command::Batch(args) => run_batch(args, &cli.presets_dir),
        Command::Fingerprint(args) => run_fingerprint(args),
    }
}

fn run_process(args: ProcessArgs, presets_dir: &Path) -> Result<i32> {
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let preset = load_named_preset(args.preset.as_deref(), presets_dir)?;
    let manual = parse_manual_interval(args.intro_start.as_deref(), args.intro_end.as_deref())?;
    let settings = resolve_settings(
        preset,
        args.fingerprint,
        manual,
        args.duck_db,
        args.target_intro_lufs,
        args.fade,
        args.report_json,
        args.dry_run,
    );

    let outcome = pipeline::process_episode(&args.input, args.output.as_deref(), &settings)?;
    match outcome.output {
        Some(output) => log::info!("Done! Output: {}", output.display()),
        None => {
            log::info!("Dry run complete; planned envelope:");
            for [t, db] in &outcome.report.envelope {
                println!("{t:9.2}s  {db:+6.1} dB");
            }
        }
    }
    Ok(0)
}

fn run_analyze(args: AnalyzeArgs, presets_dir: &Path) -> Result<i32> {
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let preset = load_named_preset(args.preset.as_deref(), presets_dir)?;
    let settings = resolve_settings(preset, args.fingerprint, None, None, None, None, false, true);

    match pipeline::analyze_episode(&args.input, &settings) {
        Ok(summary) => {
            println!("File:           {}", args.input.display());
            println!("Duration:       {:.2}s", summary.duration);
            println!(
                "Intro:          {:.2}s - {:.2}s ({:.2}s)",
                summary.detected.start,
                summary.detected.end,
                summary.detected.end - summary.detected.start
            );
            println!("Score:          {:.3}", summary.detected.score);
            if let Some(lufs) = summary.episode_lufs {
                println!("Episode LUFS:   {lufs:.1}");
            }
            if let Some(lufs) = summary.intro_lufs {
                println!("Intro LUFS:     {lufs:.1}");
            }
            Ok(0)
        }
        Err(ProcessError::NoMatch {
            best_score,
            min_score,
        }) => {
            println!("No match: best score {best_score:.3} below threshold {min_score:.2}");
            Ok(2)
        }
        Err(e) => Err(e.into()),
    }
}

fn run_batch(args: BatchArgs, presets_dir: &Path) -> Result<i32> {
    if !args.input_dir.is_dir() {
        anyhow::bail!("Directory not found: {}", args.input_dir.display());
    }

    let preset = load_named_preset(Some(&args.preset), presets_dir)?;
    let settings = resolve_settings(
        preset,
        None,
        None,
        args.duck_db,
        None,
        args.fade,
        false,
        false,
    );

    Ok(batch::run(
        &args.input_dir,
        args.recursive,
        args.require_match,
        &settings,
    )?)
}

fn run_fingerprint(args: FingerprintArgs) -> Result<i32> {
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let start = cli::parse_timecode(&args.intro_start).map_err(ProcessError::InvalidInterval)?;
    let end = cli::parse_timecode(&args.intro_end).map_err(ProcessError::InvalidInterval)?;

    let fp = pipeline::create_fingerprint(
        &args.input,
        start,
        end,
        &args.label,
        &args.output,
        &AnalysisConfig::default(),
    )?;
    println!(
        "Fingerprint: {} frames covering {:.2}s - {:.2}s",
        fp.features.n_frames(),
        fp.start_time,
        fp.end_time
    );
    Ok(0)
}

fn load_named_preset(name: Option<&str>, presets_dir: &Path) -> Result<Option<Preset>> {
    match name {
        Some(name) => {
            let preset = config::load_preset(name, presets_dir)?;
            log::info!("Loaded preset: {name}");
            Ok(Some(preset))
        }
        None => Ok(None),
    }
}

fn parse_manual_interval(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Option<(f64, f64)>, ProcessError> {
    match (start, end) {
        (Some(start), Some(end)) => {
            let start = cli::parse_timecode(start).map_err(ProcessError::InvalidInterval)?;
            let end = cli::parse_timecode(end).map_err(ProcessError::InvalidInterval)?;
            if end <= start {
                return Err(ProcessError::InvalidInterval(format!(
                    "manual interval {start:.2}..{end:.2}s is not ordered"
                )));
            }
            Ok(Some((start, end)))
        }
        _ => Ok(None),
    }
}

/// Merge CLI flags over preset values over built-in defaults.
fn resolve_settings(
    preset: Option<Preset>,
    fingerprint_flag: Option<PathBuf>,
    manual_interval: Option<(f64, f64)>,
    duck_db_flag: Option<f64>,
    target_lufs_flag: Option<f64>,
    fade_flag: Option<f64>,
    report_json: bool,
    dry_run: bool,
) -> RequestSettings {
    let fingerprint_path =
        fingerprint_flag.or_else(|| preset.as_ref().map(|p| p.fingerprint.clone()));
    let duck_db = duck_db_flag
        .or_else(|| preset.as_ref().map(|p| p.duck_db))
        .unwrap_or(-9.0);
    let fade_seconds = fade_flag
        .or_else(|| preset.as_ref().map(|p| p.fade_seconds))
        .unwrap_or(0.12);

    // An explicit --duck-db pins fixed mode even when the preset carries a
    // loudness target.
    let target_lufs = if duck_db_flag.is_some() {
        None
    } else {
        target_lufs_flag.or_else(|| preset.as_ref().and_then(|p| p.target_lufs))
    };
    let mode = if target_lufs.is_some() {
        GainMode::TargetLufs
    } else {
        GainMode::FixedDb
    };

    let matching = MatchConfig {
        min_score: preset
            .as_ref()
            .map(|p| p.min_score)
            .unwrap_or_else(|| MatchConfig::default().min_score),
        ..MatchConfig::default()
    };

    RequestSettings {
        fingerprint_path,
        manual_interval,
        mode,
        duck_db,
        fade_seconds,
        target_lufs,
        analysis: AnalysisConfig::default(),
        matching,
        report_json,
        dry_run,
    }
}
