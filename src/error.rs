use std::time;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by document operations.
///
/// Every condition the store can report has its own variant so callers can tell
/// retryable failures ([`Error::is_retryable`]) from terminal ones.
#[derive(Debug, Error)]
pub enum Error {
    /// A document, collection, field or reference target does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A create targeted a key that is already present.
    #[error("document already exists: {0}")]
    AlreadyExists(String),
    /// A write carried a precondition that no longer holds.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    /// A concurrent writer modified a document read by the transaction before it committed.
    #[error("transaction conflict: {0}")]
    TransactionConflict(String),
    /// Network or service fault, safe to retry.
    #[error("transient failure: {0}")]
    Transient(String),
    /// The operation did not complete within the configured timeout.
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(time::Duration),
    /// The request was malformed (bad key, bad field path, misuse of a transaction).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A value could not be converted to or from its stored representation.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Any other store failure that is not worth retrying.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failed attempt may succeed if issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransactionConflict(_) | Self::Transient(_) | Self::DeadlineExceeded(_)
        )
    }

    pub(crate) fn document_not_found(key: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("document {key}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<serde_dynamo::Error> for Error {
    fn from(error: serde_dynamo::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
