use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for the persistence core.
#[derive(Error, Debug)]
pub enum PersistError {
    /// A codec pair was supplied incompletely, or the configured filename is reserved.
    #[error("configuration inconsistent: {0}")]
    ConfigurationInconsistent(String),
    /// `decode(encode(x)) != x` for some string in the verification sample.
    #[error("codec is not invertible on sample string {sample:?}")]
    CodecNotInvertible {
        /// The sample string the round trip failed on.
        sample: String,
    },
    /// An I/O error surfaced unchanged from the storage collaborator.
    #[error("I/O failure during {op} on {path:?}")]
    Io {
        /// The storage operation that failed (e.g. `"append"`, `"rename"`, `"fsync"`).
        op: &'static str,
        /// The path the operation was attempted against, if any.
        path: Option<PathBuf>,
        /// The underlying I/O error.
        #[source]
        cause: io::Error,
    },
    /// The fold's corrupt/total ratio exceeded the configured threshold.
    #[error("corruption threshold exceeded: {corrupt}/{total} corrupt records (threshold {threshold})")]
    CorruptionThresholdExceeded {
        /// Corrupt records encountered.
        corrupt: usize,
        /// Total records encountered.
        total: usize,
        /// The configured threshold that was exceeded.
        threshold: f64,
    },
    /// The log file could not be opened for append; load failed and no descriptor was installed.
    #[error("could not open log file {path:?} for append")]
    OpenFailure {
        /// The log path that failed to open.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        cause: io::Error,
    },
    /// A record failed to decode or encode as JSON.
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
    /// The controller is closed and cannot accept further operations.
    #[error("persistence controller is closed")]
    Closed,
}

/// Result type for the persistence core.
pub type Result<T> = std::result::Result<T, PersistError>;

impl PersistError {
    pub(crate) fn io(op: &'static str, path: impl Into<Option<PathBuf>>, cause: io::Error) -> Self {
        PersistError::Io {
            op,
            path: path.into(),
            cause,
        }
    }
}
