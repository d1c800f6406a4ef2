use rayon::prelude::*;
use std::collections::BTreeSet;

use crate::audio::features::FeatureMatrix;
use crate::config::MatchConfig;
use crate::error::ProcessError;

/// Best alignment of a reference fingerprint inside a candidate episode.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Intro start in seconds.
    pub start: f64,
    /// Intro end in seconds.
    pub end: f64,
    /// Confidence in [0, 1]: mean per-frame cosine similarity mapped from
    /// [-1, 1].
    pub score: f64,
    /// Frame offset of the winning alignment.
    pub best_offset_frames: usize,
}

/// Locate the reference inside the candidate feature matrix.
///
/// Two-pass search: a strided coarse scan keeps the top candidates, then
/// every offset within one stride of each survivor is evaluated. Equal
/// scores resolve to the earliest offset, since intros cluster near the
/// start of a file.
pub fn find_intro(
    candidate: &FeatureMatrix,
    reference: &FeatureMatrix,
    hop_seconds: f64,
    cfg: &MatchConfig,
) -> Result<MatchResult, ProcessError> {
    let n_r = reference.n_frames();
    let n_c = candidate.n_frames();

    if n_r == 0 {
        return Err(ProcessError::FingerprintEmpty);
    }
    if reference.dim() != candidate.dim() {
        return Err(ProcessError::FingerprintIncompatible(format!(
            "reference dim {} != candidate dim {}",
            reference.dim(),
            candidate.dim()
        )));
    }
    if n_c < n_r {
        return Err(ProcessError::NoMatch {
            best_score: 0.0,
            min_score: cfg.min_score,
        });
    }

    let max_offset = n_c - n_r;
    let stride = cfg.stride.max(1);

    // Coarse pass over every stride-th offset, in parallel.
    let coarse_offsets: Vec<usize> = (0..=max_offset).step_by(stride).collect();
    let mut coarse: Vec<(usize, f64)> = coarse_offsets
        .into_par_iter()
        .map(|k| (k, score_at(candidate, reference, k)))
        .collect();

    coarse.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    coarse.truncate(cfg.top_k.max(1));

    // Refine pass: every offset within one stride of each survivor.
    // Neighborhoods can overlap, so dedupe and walk in ascending order to
    // keep the earliest-offset tie-break.
    let mut refine_offsets = BTreeSet::new();
    for &(k, _) in &coarse {
        let lo = k.saturating_sub(stride);
        let hi = (k + stride).min(max_offset);
        refine_offsets.extend(lo..=hi);
    }

    let mut best_offset = 0usize;
    let mut best_raw = f64::NEG_INFINITY;
    for k in refine_offsets {
        let s = score_at(candidate, reference, k);
        if s > best_raw {
            best_raw = s;
            best_offset = k;
        }
    }

    let score = (best_raw + 1.0) / 2.0;
    if score < cfg.min_score {
        return Err(ProcessError::NoMatch {
            best_score: score,
            min_score: cfg.min_score,
        });
    }

    let start = best_offset as f64 * hop_seconds;
    Ok(MatchResult {
        start,
        end: start + n_r as f64 * hop_seconds,
        score,
        best_offset_frames: best_offset,
    })
}

/// Mean cosine similarity of the reference against the candidate rows
/// starting at offset `k`. In [-1, 1].
fn score_at(candidate: &FeatureMatrix, reference: &FeatureMatrix, k: usize) -> f64 {
    let n_r = reference.n_frames();
    let mut acc = 0.0f64;
    for i in 0..n_r {
        acc += cosine(reference.row(i), candidate.row(k + i));
    }
    acc / n_r as f64
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x as f64 * y as f64;
        na += x as f64 * x as f64;
        nb += y as f64 * y as f64;
    }
    let norm = (na * nb).sqrt();
    if norm < 1e-12 {
        return 0.0;
    }
    dot / norm
}
