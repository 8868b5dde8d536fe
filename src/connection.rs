//! Connection boundary
//!
//! The coordinator drives one exclusively-borrowed connection through a
//! narrow interface: submission is synchronous (the statement is handed to
//! the connection and is on the wire, in submission order, when
//! `send_query` returns), completion is asynchronous (the returned channel
//! resolves whenever the server answers, possibly out of submission order).

use crate::error::{QueryError, TransactionError};
use crate::value::{Row, SqlValue};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Completion signal for one submitted statement
pub type QueryCompletion = oneshot::Receiver<Result<QueryResult, QueryError>>;

/// An asynchronous connection executing one statement at a time
///
/// The connection is exclusively owned by the active transaction attempt;
/// enforcing that exclusivity (pool checkout, etc.) is the caller's
/// responsibility.
pub trait Connection: Send + Sync {
    /// Put a statement with positional parameters on the wire.
    ///
    /// Statements reach the server in `send_query` call order.
    fn send_query(&self, sql: String, params: Vec<SqlValue>) -> QueryCompletion;
}

/// Result of a completed statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of data
    pub rows: Vec<Row>,
    /// Rows affected by an INSERT/UPDATE/DELETE
    pub rows_affected: u64,
}

impl QueryResult {
    /// Check if the result has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Get a single value from the first row and column as a string
    pub fn single_value(&self) -> Option<String> {
        self.rows
            .first()
            .and_then(|row| row.first())
            .map(|v| v.to_string())
    }

    /// Get values from a specific column as strings
    pub fn column_values(&self, column_name: &str) -> Vec<String> {
        if let Some(col_index) = self.columns.iter().position(|c| c == column_name) {
            self.rows
                .iter()
                .filter_map(|row| row.get(col_index))
                .map(|v| v.to_string())
                .collect()
        } else {
            Vec::new()
        }
    }
}

/// Per-query completion handle surfaced to application code
///
/// Resolves once with the statement's outcome. Awaiting a handle before
/// issuing the next statement is how sequential dependency is expressed;
/// statements submitted without awaiting have no relative order guarantee
/// at completion time.
pub struct QueryHandle {
    rx: oneshot::Receiver<Result<QueryResult, TransactionError>>,
}

impl QueryHandle {
    pub(crate) fn new(rx: oneshot::Receiver<Result<QueryResult, TransactionError>>) -> Self {
        Self { rx }
    }
}

impl Future for QueryHandle {
    type Output = Result<QueryResult, TransactionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| match res {
            Ok(outcome) => outcome,
            Err(_) => Err(TransactionError::ConnectionClosed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> QueryResult {
        QueryResult {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![
                vec![SqlValue::I64(1), SqlValue::from("bar")],
                vec![SqlValue::I64(2), SqlValue::from("quux")],
            ],
            rows_affected: 0,
        }
    }

    #[test]
    fn single_value_reads_first_cell() {
        assert_eq!(sample_result().single_value(), Some("1".to_string()));
        assert_eq!(QueryResult::default().single_value(), None);
    }

    #[test]
    fn column_values_select_by_name() {
        let values = sample_result().column_values("name");
        assert_eq!(values, vec!["'bar'".to_string(), "'quux'".to_string()]);
        assert!(sample_result().column_values("missing").is_empty());
    }
}
