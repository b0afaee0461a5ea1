use thiserror::Error;

/// Errors that a single [`Transport`](crate::transport::Transport) call can produce.
///
/// These never cross a trial boundary: a worker that observes one stops, and the trial is
/// reported as failed.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {message}")]
    Status {
        /// The status code reported by the backend.
        status: u16,
        /// The message or reason phrase reported by the backend.
        message: String,
    },

    /// The requested blob does not exist in the backend.
    #[error("blob `{name}` not found")]
    NotFound {
        /// Name of the missing blob.
        name: String,
    },

    /// The backend returned a different number of bytes than the caller expected.
    #[error("blob `{name}` has {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Name of the blob.
        name: String,
        /// The size of the caller-provided buffer.
        expected: u64,
        /// The size the backend produced.
        actual: u64,
    },

    /// I/O errors from filesystem backends.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the HTTP client stack, such as connection failures.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport resources could not be (re-)provisioned.
    #[error("transport setup failed: {0}")]
    Setup(String),
}

impl TransferError {
    /// Returns the status code associated with this error, if the backend reported one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// A convenience alias that defaults our [`TransferError`] type.
pub type Result<T, E = TransferError> = std::result::Result<T, E>;
