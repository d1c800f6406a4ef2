use std::path::{Path, PathBuf};

use crate::audio::{features, ingest, loudness};
use crate::config::{AnalysisConfig, MatchConfig};
use crate::detect::fingerprint::Fingerprint;
use crate::detect::matcher;
use crate::error::ProcessError;
use crate::gain::envelope::{self, GainMode, PlanInput};
use crate::gain::filtergraph;
use crate::media;
use crate::render;
use crate::report::{DetectedInterval, DetectionSource, LoudnessInfo, Report};

/// Fully resolved settings for one request: CLI flags merged over preset
/// values merged over defaults. Owned per request; batch workers clone it.
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub fingerprint_path: Option<PathBuf>,
    pub manual_interval: Option<(f64, f64)>,
    pub mode: GainMode,
    pub duck_db: f64,
    pub fade_seconds: f64,
    pub target_lufs: Option<f64>,
    pub analysis: AnalysisConfig,
    pub matching: MatchConfig,
    pub report_json: bool,
    pub dry_run: bool,
}

pub struct ProcessOutcome {
    pub report: Report,
    /// Where the rendered file landed; `None` on a dry run.
    pub output: Option<PathBuf>,
}

/// `<stem>.ducked<ext>` next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    let name = match input.extension() {
        Some(ext) => format!("{stem}.ducked.{}", ext.to_string_lossy()),
        None => format!("{stem}.ducked"),
    };
    input.with_file_name(name)
}

fn report_path(output: &Path) -> PathBuf {
    let mut os = output.as_os_str().to_os_string();
    os.push(".json");
    PathBuf::from(os)
}

/// Run the full pipeline for one episode: ingest, detect, meter, plan,
/// synthesize, render.
pub fn process_episode(
    input: &Path,
    output_override: Option<&Path>,
    settings: &RequestSettings,
) -> Result<ProcessOutcome, ProcessError> {
    let info = media::probe(input)?;
    let stream = info.default_audio(input)?.clone();
    let pcm = ingest::ingest(input, &stream, settings.analysis.sample_rate)?;

    let detected = detect_interval(&pcm, settings)?;
    log::info!(
        "Intro {:.2}s..{:.2}s (score {:.3}, {})",
        detected.start,
        detected.end,
        detected.score,
        match detected.source {
            DetectionSource::Fingerprint => "fingerprint",
            DetectionSource::Manual => "manual",
        }
    );

    let episode_lufs = recover(loudness::integrated_lufs(&pcm.samples, pcm.sample_rate))?;
    let intro_lufs = recover(loudness::integrated_lufs(
        pcm.slice_seconds(detected.start, detected.end),
        pcm.sample_rate,
    ))?;
    if let (Some(ep), Some(intro)) = (episode_lufs, intro_lufs) {
        log::info!("Loudness: episode {ep:.1} LUFS, intro {intro:.1} LUFS");
    }

    // The probe and the decode can disagree by a frame's worth of time;
    // validate against the larger so a detected interval at the very end
    // of the file is not spuriously rejected.
    let episode_duration = info.duration.max(pcm.duration_seconds());
    drop(pcm);

    let envelope = envelope::plan(&PlanInput {
        intro_start: detected.start,
        intro_end: detected.end,
        episode_duration,
        intro_lufs,
        mode: settings.mode,
        fade_seconds: settings.fade_seconds,
        duck_db: settings.duck_db,
        target_lufs: settings.target_lufs,
    })?;
    let plateau = envelope.plateau_db();
    log::info!("Duck plateau: {plateau:+.1} dB, fade {:.2}s", settings.fade_seconds);

    let mut render_plan = filtergraph::synthesize(&envelope, info.duration);
    render_plan.copy_video = info.has_video;
    render_plan.copy_subtitles = info.has_subtitles;

    let out_path = output_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input));

    if !settings.dry_run {
        render::render(input, &out_path, &render_plan, &stream)?;
    } else {
        log::info!("Dry run: would write {}", out_path.display());
    }

    let report = Report {
        input: input.display().to_string(),
        output: (!settings.dry_run).then(|| out_path.display().to_string()),
        detected,
        loudness: LoudnessInfo {
            episode_lufs,
            intro_lufs_before: intro_lufs,
            intro_lufs_after: intro_lufs.map(|l| l + plateau),
        },
        envelope: envelope
            .breakpoints()
            .iter()
            .map(|&(t, g)| [t, g])
            .collect(),
        duration_seconds: info.duration,
    };

    if settings.report_json && !settings.dry_run {
        let path = report_path(&out_path);
        report.save(&path)?;
        log::info!("Report saved: {}", path.display());
    }

    Ok(ProcessOutcome {
        report,
        output: (!settings.dry_run).then_some(out_path),
    })
}

/// Detection summary for `analyze`.
pub struct AnalysisSummary {
    pub detected: DetectedInterval,
    pub episode_lufs: Option<f64>,
    pub intro_lufs: Option<f64>,
    pub duration: f64,
}

/// Detection and metering without planning or rendering.
pub fn analyze_episode(
    input: &Path,
    settings: &RequestSettings,
) -> Result<AnalysisSummary, ProcessError> {
    let info = media::probe(input)?;
    let stream = info.default_audio(input)?.clone();
    let pcm = ingest::ingest(input, &stream, settings.analysis.sample_rate)?;

    let detected = detect_interval(&pcm, settings)?;
    let episode_lufs = recover(loudness::integrated_lufs(&pcm.samples, pcm.sample_rate))?;
    let intro_lufs = recover(loudness::integrated_lufs(
        pcm.slice_seconds(detected.start, detected.end),
        pcm.sample_rate,
    ))?;

    Ok(AnalysisSummary {
        detected,
        episode_lufs,
        intro_lufs,
        duration: info.duration,
    })
}

/// Build and save a reference fingerprint from a hand-labeled interval.
pub fn create_fingerprint(
    input: &Path,
    start: f64,
    end: f64,
    label: &str,
    output: &Path,
    analysis: &AnalysisConfig,
) -> Result<Fingerprint, ProcessError> {
    let info = media::probe(input)?;
    let stream = info.default_audio(input)?.clone();
    let pcm = ingest::ingest(input, &stream, analysis.sample_rate)?;

    let fp = Fingerprint::build(&pcm, start, end, label, analysis)?;
    fp.save(output)?;
    log::info!(
        "Fingerprint saved: {} ({} frames, {:.1}s reference)",
        output.display(),
        fp.features.n_frames(),
        end - start
    );
    Ok(fp)
}

fn detect_interval(
    pcm: &ingest::PcmBuffer,
    settings: &RequestSettings,
) -> Result<DetectedInterval, ProcessError> {
    if let Some((start, end)) = settings.manual_interval {
        return Ok(DetectedInterval {
            start,
            end,
            score: 1.0,
            source: DetectionSource::Manual,
        });
    }

    let path = settings.fingerprint_path.as_deref().ok_or_else(|| {
        ProcessError::InvalidInterval(
            "no fingerprint and no manual interval to locate the intro".into(),
        )
    })?;

    let reference = Fingerprint::load(path, &settings.analysis)?;
    let candidate = features::extract(pcm, &settings.analysis);
    let result = matcher::find_intro(
        &candidate,
        &reference.features,
        settings.analysis.hop_seconds(),
        &settings.matching,
    )?;
    log::debug!(
        "Best alignment at frame {} of {}",
        result.best_offset_frames,
        candidate.n_frames()
    );

    Ok(DetectedInterval {
        start: result.start,
        end: result.end,
        score: result.score,
        source: DetectionSource::Fingerprint,
    })
}

/// `LoudnessUndefined` is recoverable: the planner falls back to fixed-dB
/// and the report carries a null reading.
fn recover(result: Result<f64, ProcessError>) -> Result<Option<f64>, ProcessError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(ProcessError::LoudnessUndefined) => {
            log::warn!("Interval too short for gated loudness; falling back to fixed duck");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_keeps_directory_and_extension() {
        assert_eq!(
            default_output_path(Path::new("/shows/s01e01.mkv")),
            PathBuf::from("/shows/s01e01.ducked.mkv")
        );
        assert_eq!(
            default_output_path(Path::new("episode")),
            PathBuf::from("episode.ducked")
        );
    }

    #[test]
    fn report_lands_next_to_the_output() {
        assert_eq!(
            report_path(Path::new("/shows/out.mkv")),
            PathBuf::from("/shows/out.mkv.json")
        );
    }
}
