//! Core coordinator implementation
//!
//! Owns the connection and the injected tracer, and drives transaction
//! attempts: fresh completion group, BEGIN, the caller's block, then the
//! aggregate outcome, retrying the whole transaction on serialization
//! conflicts when configured.

use crate::connection::Connection;
use crate::error::Result;
use crate::group::CompletionGroup;
use crate::options::TransactionOptions;
use crate::trace::{NoopTracer, QueryTracer};
use crate::transaction::Transaction;
use std::future::Future;
use std::sync::Arc;

/// Transaction coordinator for one exclusively-borrowed connection
pub struct Coordinator {
    connection: Arc<dyn Connection>,
    tracer: Arc<dyn QueryTracer>,
}

impl Coordinator {
    /// Create a coordinator with statement tracing disabled.
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self::with_tracer(connection, Arc::new(NoopTracer))
    }

    /// Create a coordinator emitting every statement to `tracer`.
    pub fn with_tracer(connection: Arc<dyn Connection>, tracer: Arc<dyn QueryTracer>) -> Self {
        Self { connection, tracer }
    }

    /// Run `body` inside a transaction and resolve its single aggregate
    /// outcome.
    ///
    /// Sends BEGIN (with the isolation clause `options` selects), invokes
    /// `body` with the transaction handle once BEGIN is confirmed, and
    /// resolves when the attempt's completion group does: `Ok` after a
    /// successful COMMIT, `Err` with the first error that caused rollback.
    ///
    /// If BEGIN fails, `body` is never invoked and the attempt rolls
    /// back. If `body` returns an error, the attempt rolls back with that
    /// error as cause. With `options.retry` set, a serialization-conflict
    /// failure transparently starts a fresh attempt, re-running `body`
    /// from scratch; the caller observes one outcome across however many
    /// attempts occur.
    pub async fn begin_transaction<F, Fut>(
        &self,
        options: TransactionOptions,
        body: F,
    ) -> Result<()>
    where
        F: Fn(Transaction) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut attempt: u64 = 1;
        loop {
            match self.run_attempt(&options, &body, attempt).await {
                Ok(()) => return Ok(()),
                Err(err) if options.retry && err.is_serialization_failure() => {
                    tracing::debug!(attempt, "retrying transaction after conflict: {}", err);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One BEGIN..COMMIT/ROLLBACK cycle.
    async fn run_attempt<F, Fut>(
        &self,
        options: &TransactionOptions,
        body: &F,
        attempt: u64,
    ) -> Result<()>
    where
        F: Fn(Transaction) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let (group, outcome) = CompletionGroup::new();
        let txn = Transaction::new(
            self.connection.clone(),
            options.clone(),
            group,
            self.tracer.clone(),
            attempt,
        );

        // BEGIN failure has already rolled the attempt back by the time
        // the handle resolves; the block is never invoked
        if txn.send_begin().await.is_ok() {
            if let Err(err) = body(txn.clone()).await {
                txn.rollback(err);
            }
        }

        outcome.await
    }
}

/// Run `body` inside a transaction on `connection` with a default
/// coordinator. See [`Coordinator::begin_transaction`].
pub async fn begin_transaction<F, Fut>(
    connection: Arc<dyn Connection>,
    options: TransactionOptions,
    body: F,
) -> Result<()>
where
    F: Fn(Transaction) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    Coordinator::new(connection).begin_transaction(options, body).await
}
