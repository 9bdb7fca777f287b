use std::{fmt, path::PathBuf};

use diffusion_core::CoreError;

/// The result type used across the trainer.
pub type Result<T> = std::result::Result<T, TrainError>;

/// All errors that can abort a training run.
///
/// Absence of a resume or EMA checkpoint is *not* an error anywhere in
/// this crate; those paths return `Option` and fall back to cold
/// starts. Everything below is fatal to the process.
#[derive(Debug)]
pub enum TrainError {
    /// Invalid configuration, caught before the loop starts.
    InvalidConfig(String),
    /// A tensor-level invariant was violated (shape or name mismatch,
    /// per-example gradient disagreement).
    Core(CoreError),
    /// Checkpoint I/O failed.
    Io(std::io::Error),
    /// A snapshot file exists but cannot be (de)serialized.
    BadSnapshot { path: PathBuf, reason: String },
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Core(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::BadSnapshot { path, reason } => {
                write!(f, "bad snapshot {}: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for TrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Core(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CoreError> for TrainError {
    fn from(e: CoreError) -> Self {
        Self::Core(e)
    }
}

impl From<std::io::Error> for TrainError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
