//! Transaction configuration

use crate::error::TransactionError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// The SQL spelling used in the BEGIN statement.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read_uncommitted" | "read uncommitted" => Ok(IsolationLevel::ReadUncommitted),
            "read_committed" | "read committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" | "repeatable read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            _ => Err(TransactionError::InvalidIsolation(s.to_string())),
        }
    }
}

/// Per-transaction configuration
///
/// The default is a plain `BEGIN`: no isolation clause, not deferrable,
/// no conflict retry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionOptions {
    /// Isolation level clause for the BEGIN statement. `None` sends `BEGIN`.
    pub isolation: Option<IsolationLevel>,

    /// Append ` DEFERRABLE` to the BEGIN statement.
    pub deferrable: bool,

    /// Transparently retry the whole transaction on a serialization
    /// conflict. The retry re-runs the caller's block against a fresh
    /// attempt; there is no attempt cap.
    pub retry: bool,
}

impl TransactionOptions {
    /// Options for a plain `BEGIN`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    /// Mark the transaction deferrable.
    pub fn deferrable(mut self, deferrable: bool) -> Self {
        self.deferrable = deferrable;
        self
    }

    /// Enable retry on serialization conflict.
    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    /// Build options from string-typed configuration.
    ///
    /// An unrecognized isolation name fails here, before anything is sent
    /// on the connection.
    pub fn from_config(
        isolation: Option<&str>,
        deferrable: bool,
        retry: bool,
    ) -> Result<Self, TransactionError> {
        let isolation = match isolation {
            Some(name) => Some(name.parse()?),
            None => None,
        };
        Ok(Self {
            isolation,
            deferrable,
            retry,
        })
    }

    /// The exact BEGIN statement these options produce.
    pub fn begin_statement(&self) -> String {
        let mut stmt = match self.isolation {
            Some(level) => format!("BEGIN TRANSACTION ISOLATION LEVEL {}", level.as_sql()),
            None => String::from("BEGIN"),
        };
        if self.deferrable {
            stmt.push_str(" DEFERRABLE");
        }
        stmt
    }
}
