//! Transaction coordination for asynchronous Postgres-style connections
//!
//! This crate lets a caller issue `BEGIN`, run an arbitrary,
//! dynamically-determined sequence of queries over one exclusively
//! borrowed connection, and reliably reach exactly one of two outcomes,
//! COMMIT or ROLLBACK, even though individual queries complete at
//! arbitrary, possibly out-of-order times.
//!
//! Two pieces:
//!
//! - [`CompletionGroup`]: a fan-in primitive aggregating an open-ended,
//!   dynamically growing set of in-flight operations into a single
//!   one-shot success/failure signal, armed by an explicit close.
//! - [`Coordinator`]: the transaction state machine on top of it,
//!   enforcing begin/commit/rollback ordering, automatic rollback on
//!   failure, a single-commit invariant, and optional transparent retry
//!   of the whole transaction on serialization conflicts.
//!
//! ```no_run
//! use pg_coordinator::{begin_transaction, MockConnection, SqlValue, TransactionOptions};
//! use std::sync::Arc;
//!
//! # async fn demo() -> pg_coordinator::Result<()> {
//! let connection = Arc::new(MockConnection::new());
//! begin_transaction(connection, TransactionOptions::default(), |txn| async move {
//!     let inserted = txn.insert("pets", &[("name", SqlValue::from("bar"))])?;
//!     inserted.await?;
//!     txn.commit();
//!     Ok(())
//! })
//! .await
//! # }
//! ```

pub mod connection;
pub mod coordinator;
pub mod error;
pub mod group;
pub mod mock;
pub mod options;
pub mod sql;
pub mod trace;
pub mod transaction;
pub mod value;

pub use connection::{Connection, QueryCompletion, QueryHandle, QueryResult};
pub use coordinator::{begin_transaction, Coordinator};
pub use error::{QueryError, Result, TransactionError, SERIALIZATION_FAILURE_CODE};
pub use group::{CompletionGroup, GroupMember, GroupOutcome};
pub use mock::{MockConnection, SentStatement};
pub use options::{IsolationLevel, TransactionOptions};
pub use sql::{insert_statement, OnConflictUpdate, UpsertBuilder};
pub use trace::{LogTracer, NoopTracer, QueryTracer};
pub use transaction::{CommitStatus, Transaction};
pub use value::{Row, SqlValue};
