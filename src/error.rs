//! Error taxonomy for the session core.
//!
//! Two families of failure exist:
//!
//! - [`ValidationError`]: caught locally, before any request leaves the
//!   process. The caller gets it back immediately and no component state
//!   changes beyond the input that was rejected.
//! - [`ServiceError`]: produced by a remote call. Components never let these
//!   escape their public operations; they are folded into a state transition
//!   (`Failed`, `Error`) or a one-shot status string. They are public so
//!   service implementations and tests can construct them.
//!
//! Stale responses are not errors at all: they are dropped by generation
//! checks inside each component and only show up in `debug` logs.

use thiserror::Error;

/// Input rejected before it reached a remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Search query was empty or whitespace-only.
    #[error("query must not be empty")]
    EmptyQuery,

    /// Ingest URL is not an absolute http(s) URL.
    #[error("not a valid URL: {0}")]
    InvalidUrl(String),

    /// Structured document is missing required keys or is not JSON.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// An ingestion job is still submitting or polling.
    #[error("an ingestion job is already in progress")]
    JobInProgress,

    /// No record with this id in the current result set.
    #[error("no result with id '{0}' in the current result set")]
    UnknownItem(String),
}

/// Failure reported by a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Connection, timeout, or other network failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered but declined the operation.
    #[error("rejected ({status}): {}", .message.as_deref().unwrap_or("no detail"))]
    Rejected {
        status: u16,
        /// Service-provided reason (`detail` field), when present.
        message: Option<String>,
    },

    /// The response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// The service-provided rejection reason, if any.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            ServiceError::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Decode(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}
