//! Error types for counter sources and probes.
//!
//! Every failure a probe can hit is expressed as a [`ProbeError`]. The
//! registry contains these at the probe boundary; nothing here ever reaches
//! the caller of a snapshot.

use std::io;
use std::path::{Path, PathBuf};

/// Failure raised while opening, reading or parsing a kernel counter node.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The node does not exist on this device.
    #[error("node not found: {0}")]
    NotFound(PathBuf),

    /// Normal and privileged access were both refused.
    #[error("access denied: {0}")]
    AccessDenied(PathBuf),

    /// Read failed; the source is disabled for the rest of the session.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Kernel output did not have the expected structure.
    #[error("{what}: pattern mismatch ({detail})")]
    ParseMismatch { what: String, detail: String },

    /// The source was disabled by an earlier failure.
    #[error("source unavailable: {0}")]
    Unavailable(PathBuf),
}

/// Coarse classification used for statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    Io,
    ParseMismatch,
    Unavailable,
}

impl ProbeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProbeError::NotFound(_) => ErrorKind::NotFound,
            ProbeError::AccessDenied(_) => ErrorKind::AccessDenied,
            ProbeError::Io { .. } => ErrorKind::Io,
            ProbeError::ParseMismatch { .. } => ErrorKind::ParseMismatch,
            ProbeError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    pub fn parse(what: impl Into<String>, detail: impl Into<String>) -> Self {
        ProbeError::ParseMismatch {
            what: what.into(),
            detail: detail.into(),
        }
    }

    /// Maps an `io::Error` for `path` onto the probe taxonomy.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ProbeError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => ProbeError::AccessDenied(path.to_path_buf()),
            _ => ProbeError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;
