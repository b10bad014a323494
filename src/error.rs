//! Error types for the download pipeline.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can make a download fail.
///
/// Each variant is fatal for the download it belongs to: there is no
/// partial success.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Connection or protocol failure below the HTTP status layer.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server responded with status {code}")]
    HttpStatus { code: u16 },

    /// The probe could not determine the resource length.
    #[error("resource size unknown: {0}")]
    SizeUnknown(String),

    /// The server does not honor byte-range requests.
    #[error("server does not support byte-range requests")]
    RangeUnsupported,

    /// A `Content-Disposition` header was present but could not be parsed.
    #[error("malformed filename hint: {0:?}")]
    FilenameResolution(String),

    /// Local read or write failure on a section artifact or the export path.
    #[error("I/O error on {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A section body did not match the length of its byte range.
    #[error("section {index} returned {actual} bytes, expected {expected}")]
    LengthMismatch {
        index: usize,
        expected: u64,
        actual: u64,
    },

    /// The download was cancelled before it could finish.
    #[error("download cancelled")]
    Cancelled,

    #[error("invalid download request: {0}")]
    InvalidRequest(String),

    /// A fetch task panicked or was aborted by the runtime.
    #[error("fetch task failed: {0}")]
    TaskFailed(String),
}

impl DownloadError {
    /// Wraps an I/O error with the path it happened on.
    pub fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T, E = DownloadError> = std::result::Result<T, E>;
