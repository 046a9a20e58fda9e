//! Pipeline error taxonomy.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors produced by a proxy pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyError {
    /// The execution context was cancelled before the call finished.
    #[error("context canceled")]
    Cancelled,

    /// The execution context deadline passed before the call finished.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Generic failure reported to clients when a call timed out without an error.
    #[error("internal server error")]
    Internal,

    /// A failure that carries the HTTP status to report to the client.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// Transport or backend failure.
    #[error("{0}")]
    Backend(String),

    /// The request body could not be buffered.
    #[error("reading request body: {0}")]
    Body(String),

    /// The backend response could not be decoded.
    #[error("decoding backend response: {0}")]
    Decode(String),

    /// The outbound request could not be built.
    #[error("building backend request: {0}")]
    InvalidRequest(String),

    /// Several backends failed.
    #[error("{}", join_messages(.0))]
    Merged(Vec<ProxyError>),
}

impl ProxyError {
    /// Build a backend error from any message.
    pub fn backend(message: impl Into<String>) -> Self {
        ProxyError::Backend(message.into())
    }

    /// Build an error that exposes `status` to the endpoint handler.
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        ProxyError::Status {
            status,
            message: message.into(),
        }
    }

    /// The status code this error asks the handler to use, if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            ProxyError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for errors derived from the execution context.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ProxyError::Cancelled | ProxyError::DeadlineExceeded)
    }
}

fn join_messages(errors: &[ProxyError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
