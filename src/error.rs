//! Error types for transaction coordination

use crate::transaction::CommitStatus;
use std::fmt;
use thiserror::Error;

/// SQLSTATE code reported when a transaction could not be serialized
/// against concurrent transactions and should be retried.
pub const SERIALIZATION_FAILURE_CODE: &str = "40001";

/// An error reported by the connection for a specific statement.
///
/// Carries an optional SQLSTATE-style code so callers (and the retry
/// machinery) can distinguish error classes without parsing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    code: Option<String>,
    message: String,
}

impl QueryError {
    /// Create a query error with no SQLSTATE code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Create a query error carrying a SQLSTATE code.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Create a serialization-conflict error (SQLSTATE 40001).
    pub fn serialization_failure(message: impl Into<String>) -> Self {
        Self::with_code(SERIALIZATION_FAILURE_CODE, message)
    }

    /// The SQLSTATE code, if the server reported one.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this is a serialization-conflict error.
    pub fn is_serialization_failure(&self) -> bool {
        self.code.as_deref() == Some(SERIALIZATION_FAILURE_CODE)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} (SQLSTATE {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for QueryError {}

/// Transaction error types
#[derive(Debug, Clone, Error)]
pub enum TransactionError {
    /// The configured isolation level was not recognized. Raised before
    /// any statement is sent.
    #[error("invalid isolation level: {0}")]
    InvalidIsolation(String),

    /// A query was attempted after the transaction reached a terminal
    /// status. Raised synchronously; nothing is sent.
    #[error("transaction is already {0}")]
    TransactionClosed(CommitStatus),

    /// The connection reported an error for a specific statement.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The connection dropped a completion channel before the query
    /// resolved.
    #[error("connection closed before the query completed")]
    ConnectionClosed,
}

impl TransactionError {
    /// Whether this failure is a serialization conflict eligible for
    /// transaction retry.
    pub fn is_serialization_failure(&self) -> bool {
        matches!(self, TransactionError::Query(err) if err.is_serialization_failure())
    }
}

/// Result type for transaction operations
pub type Result<T> = std::result::Result<T, TransactionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_failure_is_detected_by_code() {
        let err = QueryError::serialization_failure("could not serialize access");
        assert!(err.is_serialization_failure());
        assert_eq!(err.code(), Some(SERIALIZATION_FAILURE_CODE));

        let wrapped = TransactionError::from(err);
        assert!(wrapped.is_serialization_failure());
    }

    #[test]
    fn plain_query_errors_are_not_retryable() {
        let err = QueryError::with_code("23505", "duplicate key value");
        assert!(!err.is_serialization_failure());
        assert!(!TransactionError::from(QueryError::new("boom")).is_serialization_failure());
    }

    #[test]
    fn display_includes_sqlstate_when_present() {
        let err = QueryError::with_code("40001", "could not serialize access");
        assert_eq!(err.to_string(), "could not serialize access (SQLSTATE 40001)");
        assert_eq!(QueryError::new("boom").to_string(), "boom");
    }
}
