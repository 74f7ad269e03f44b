//! Error types for store gateways.

use thiserror::Error;

/// Result type for gateway operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a store gateway call can raise.
///
/// Callers only use the distinction for logging and reporting: neither kind
/// aborts sibling operations on other destinations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Destination unreachable or temporarily failing.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the request (malformed record, constraint violation).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The store does not implement the requested capability.
    #[error("operation not supported: {0}")]
    Unsupported(String),
}

impl StoreError {
    /// Whether a later attempt may succeed without changing the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
