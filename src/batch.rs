use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::ProcessError;
use crate::pipeline::{self, RequestSettings};

const MEDIA_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "m4v"];

enum ItemStatus {
    Done(PathBuf),
    /// Detection below threshold; the file is left untouched.
    Skipped,
    Failed(ProcessError),
}

/// Process every recognized media file under `dir`.
///
/// Items run on parallel workers; each owns its PCM and feature matrix, so
/// the only shared state is the read-only settings. Failures are recorded
/// per item and the run continues.
///
/// Returns the aggregate exit code: 0 when everything succeeded (skips
/// included), 2 when the only failures were missed detections, 1 otherwise.
pub fn run(
    dir: &Path,
    recursive: bool,
    require_match: bool,
    settings: &RequestSettings,
) -> Result<i32, ProcessError> {
    let files = collect_media_files(dir, recursive)?;
    if files.is_empty() {
        log::warn!("No media files found in {}", dir.display());
        return Ok(0);
    }
    log::info!("Batch: {} file(s)", files.len());

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} episodes ({eta} remaining)")
            .unwrap()
            .progress_chars("=>-"),
    );

    let outcomes: Vec<(PathBuf, ItemStatus)> = files
        .par_iter()
        .map(|file| {
            let status = match pipeline::process_episode(file, None, settings) {
                Ok(outcome) => ItemStatus::Done(
                    outcome.output.unwrap_or_else(|| file.clone()),
                ),
                Err(ProcessError::NoMatch { best_score, .. }) if !require_match => {
                    log::warn!(
                        "{}: no intro match (best score {best_score:.3}), skipping",
                        file.display()
                    );
                    ItemStatus::Skipped
                }
                Err(e) => ItemStatus::Failed(e),
            };
            pb.inc(1);
            (file.clone(), status)
        })
        .collect();

    pb.finish_and_clear();

    let mut done = 0usize;
    let mut skipped = 0usize;
    let mut no_match_failures = 0usize;
    let mut other_failures = 0usize;
    for (file, status) in &outcomes {
        match status {
            ItemStatus::Done(output) => {
                done += 1;
                log::info!("{} -> {}", file.display(), output.display());
            }
            ItemStatus::Skipped => skipped += 1,
            ItemStatus::Failed(e) => {
                if matches!(e, ProcessError::NoMatch { .. }) {
                    no_match_failures += 1;
                } else {
                    other_failures += 1;
                }
                log::error!("{}: {e}", file.display());
            }
        }
    }
    log::info!(
        "Batch complete: {done} processed, {skipped} skipped, {} failed",
        no_match_failures + other_failures
    );

    if other_failures > 0 {
        Ok(1)
    } else if no_match_failures > 0 {
        Ok(2)
    } else {
        Ok(0)
    }
}

fn collect_media_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, ProcessError> {
    let mut files = Vec::new();

    if recursive {
        for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() && is_media_file(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() && is_media_file(&entry.path()) {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            MEDIA_EXTENSIONS.iter().any(|m| *m == e)
        })
        .unwrap_or(false)
}
