use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy for a single processing request.
///
/// Recoverable conditions (`LoudnessUndefined`) are handled inside the
/// pipeline; everything else surfaces to the request boundary where `main`
/// maps it to an exit code.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to decode audio from {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("fingerprint incompatible with extractor: {0}")]
    FingerprintIncompatible(String),

    #[error("reference fingerprint contains no frames")]
    FingerprintEmpty,

    #[error("no intro match (best score {best_score:.3}, threshold {min_score:.3})")]
    NoMatch { best_score: f64, min_score: f64 },

    #[error("interval too short for gated loudness integration")]
    LoudnessUndefined,

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("renderer failed: {0}")]
    Renderer(String),

    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: &'static str, seconds: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// Exit code convention: 0 success, 1 generic error, 2 detection
    /// failure, 3 invalid arguments, 4 external-tool failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcessError::NoMatch { .. } => 2,
            ProcessError::InvalidInterval(_) => 3,
            ProcessError::Decode { .. }
            | ProcessError::Renderer(_)
            | ProcessError::Timeout { .. } => 4,
            _ => 1,
        }
    }
}
