//! Errors that stop the tailing loop.
//!
//! Everything else (read hiccups, unmatched lines, zero-valued times) is
//! handled where it happens and never reaches the caller.

use std::io;
use std::path::PathBuf;

/// Fatal tailing failure.
#[derive(Debug)]
pub enum TailError {
    /// The log file could not be opened at startup.
    Open { path: PathBuf, source: io::Error },
    /// The log path stayed unreachable across too many wait cycles.
    Unavailable {
        path: PathBuf,
        attempts: u32,
        source: io::Error,
    },
}

impl std::fmt::Display for TailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TailError::Open { path, source } => {
                write!(f, "cannot open {}: {}", path.display(), source)
            }
            TailError::Unavailable {
                path,
                attempts,
                source,
            } => write!(
                f,
                "{} unavailable after {} attempts: {}",
                path.display(),
                attempts,
                source
            ),
        }
    }
}

impl std::error::Error for TailError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TailError::Open { source, .. } | TailError::Unavailable { source, .. } => Some(source),
        }
    }
}
