use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CastStoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing cast header line in {path}")]
    MissingHeader { path: PathBuf },

    #[error("line {line} in {path} is not a valid cast header: {source}")]
    InvalidHeader {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line} in {path} has unsupported cast version {found}; expected 2 or 3")]
    UnsupportedVersion {
        path: PathBuf,
        line: usize,
        found: u32,
    },

    #[error("line {line} in {path} is not a valid cast event: {source}")]
    InvalidEvent {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl CastStoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn invalid_header(path: impl Into<PathBuf>, line: usize, source: serde_json::Error) -> Self {
        Self::InvalidHeader {
            path: path.into(),
            line,
            source,
        }
    }

    #[must_use]
    pub fn invalid_event(path: impl Into<PathBuf>, line: usize, source: serde_json::Error) -> Self {
        Self::InvalidEvent {
            path: path.into(),
            line,
            source,
        }
    }
}
