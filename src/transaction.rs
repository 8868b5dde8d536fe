//! Transaction handle and state machine
//!
//! The Transaction owns one attempt's completion group and drives the
//! BEGIN/COMMIT/ROLLBACK protocol over an exclusively-borrowed
//! connection, while delegating statement construction to the sql module.
//!
//! Submission is synchronous: every query method registers the operation
//! with the completion group, hands the statement to the connection, and
//! returns a [`QueryHandle`] immediately. Completion arrives later on a
//! watcher task. Awaiting a handle before issuing the next statement is
//! how callers express sequential dependency.

use crate::connection::{Connection, QueryCompletion, QueryHandle};
use crate::error::TransactionError;
use crate::group::{CompletionGroup, GroupMember};
use crate::options::TransactionOptions;
use crate::sql::{self, UpsertBuilder};
use crate::trace::QueryTracer;
use crate::value::SqlValue;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Commit status of one transaction attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    /// BEGIN sent or confirmed; queries may be issued
    Pending,
    /// COMMIT confirmed
    Committed,
    /// Rolled back, or COMMIT failed
    RolledBack,
}

impl fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitStatus::Pending => write!(f, "pending"),
            CommitStatus::Committed => write!(f, "committed"),
            CommitStatus::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// What a completion watcher does when its statement fails
#[derive(Debug, Clone, Copy)]
enum FailurePolicy {
    /// Consult the transaction's auto-rollback flag at failure time
    Auto,
    /// Always roll back (BEGIN, upsert)
    Rollback,
}

struct StatusState {
    status: CommitStatus,
    /// COMMIT has been put on the wire for this attempt
    commit_issued: bool,
}

/// Active transaction handle
///
/// Cheaply cloneable; all clones share one attempt's state. The handle is
/// passed to the caller's block by
/// [`Coordinator::begin_transaction`](crate::coordinator::Coordinator::begin_transaction).
#[derive(Clone)]
pub struct Transaction {
    connection: Arc<dyn Connection>,
    options: TransactionOptions,
    group: CompletionGroup,
    status: Arc<Mutex<StatusState>>,
    auto_rollback: Arc<AtomicBool>,
    tracer: Arc<dyn QueryTracer>,
    attempt: u64,
}

impl Transaction {
    pub(crate) fn new(
        connection: Arc<dyn Connection>,
        options: TransactionOptions,
        group: CompletionGroup,
        tracer: Arc<dyn QueryTracer>,
        attempt: u64,
    ) -> Self {
        Self {
            connection,
            options,
            group,
            status: Arc::new(Mutex::new(StatusState {
                status: CommitStatus::Pending,
                commit_issued: false,
            })),
            auto_rollback: Arc::new(AtomicBool::new(true)),
            tracer,
            attempt,
        }
    }

    /// Current commit status.
    pub fn status(&self) -> CommitStatus {
        self.status.lock().status
    }

    /// Which attempt of the logical transaction this is (1-based;
    /// increments across conflict retries).
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// The options this transaction was started with.
    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Whether a query failure automatically rolls the transaction back.
    pub fn auto_rollback(&self) -> bool {
        self.auto_rollback.load(Ordering::SeqCst)
    }

    /// Toggle automatic rollback on query failure.
    ///
    /// With the flag cleared, a failed query is reported through its
    /// [`QueryHandle`] only and the transaction stays open.
    pub fn set_auto_rollback(&self, enabled: bool) {
        self.auto_rollback.store(enabled, Ordering::SeqCst);
    }

    /// Execute a statement with positional parameters.
    ///
    /// Fails immediately, sending nothing, once the transaction has
    /// reached a terminal status.
    pub fn execute(
        &self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
    ) -> Result<QueryHandle, TransactionError> {
        self.check_open()?;
        Ok(self.dispatch(sql.into(), params, FailurePolicy::Auto))
    }

    /// Insert a row, with columns in the field slice's order.
    pub fn insert(
        &self,
        table: &str,
        fields: &[(&str, SqlValue)],
    ) -> Result<QueryHandle, TransactionError> {
        self.check_open()?;
        let (sql, params) = sql::insert_statement(table, fields);
        Ok(self.dispatch(sql, params, FailurePolicy::Auto))
    }

    /// Insert-or-update via an injected statement builder.
    ///
    /// A failure, of the builder or of the statement, rolls the
    /// transaction back regardless of the auto-rollback flag.
    pub async fn upsert(
        &self,
        builder: &dyn UpsertBuilder,
        table: &str,
        fields: &[(&str, SqlValue)],
        conflict_target: &[&str],
    ) -> Result<QueryHandle, TransactionError> {
        self.check_open()?;
        match builder.build(table, fields, conflict_target).await {
            Ok((sql, params)) => Ok(self.dispatch(sql, params, FailurePolicy::Rollback)),
            Err(err) => {
                let err = TransactionError::Query(err);
                self.rollback(err.clone());
                Err(err)
            }
        }
    }

    /// Update rows, with parameterized SET pairs and an optional raw
    /// WHERE clause.
    pub fn update(
        &self,
        table: &str,
        set: &[(&str, SqlValue)],
        where_clause: Option<&str>,
    ) -> Result<QueryHandle, TransactionError> {
        self.check_open()?;
        let (sql, params) = sql::update_statement(table, set, where_clause);
        Ok(self.dispatch(sql, params, FailurePolicy::Auto))
    }

    /// Delete rows with an optional raw WHERE clause.
    pub fn delete(
        &self,
        table: &str,
        where_clause: Option<&str>,
    ) -> Result<QueryHandle, TransactionError> {
        self.check_open()?;
        let sql = sql::delete_statement(table, where_clause);
        Ok(self.dispatch(sql, Vec::new(), FailurePolicy::Auto))
    }

    /// Issue COMMIT.
    ///
    /// No-op once the transaction is terminal or COMMIT is already on the
    /// wire. On success the attempt resolves committed and the completion
    /// group is closed. On failure the attempt resolves rolled back with
    /// COMMIT's error; no ROLLBACK statement is sent, the database has
    /// already decided the outcome.
    pub fn commit(&self) {
        {
            let mut state = self.status.lock();
            if state.status != CommitStatus::Pending || state.commit_issued {
                return;
            }
            state.commit_issued = true;
        }

        let member = self.group.add();
        let completion = self.send("COMMIT".to_string(), Vec::new());
        let txn = self.clone();
        tokio::spawn(async move {
            match completion.await {
                Ok(Ok(_)) => {
                    if txn.transition(CommitStatus::Committed) {
                        member.succeed();
                        txn.group.close();
                    }
                }
                Ok(Err(err)) => txn.finish_failed_commit(member, TransactionError::Query(err)),
                Err(_) => txn.finish_failed_commit(member, TransactionError::ConnectionClosed),
            }
        });
    }

    /// Issue ROLLBACK and resolve the attempt as rolled back with `cause`.
    ///
    /// No-op once the transaction is terminal. The ROLLBACK statement's
    /// own outcome does not change the terminal status; `cause` is what
    /// the aggregate failure surfaces.
    pub fn rollback(&self, cause: TransactionError) {
        if !self.transition(CommitStatus::RolledBack) {
            return;
        }

        let attempt = self.attempt;
        let completion = self.send("ROLLBACK".to_string(), Vec::new());
        tokio::spawn(async move {
            if let Ok(Err(err)) = completion.await {
                tracing::warn!(attempt, "ROLLBACK statement failed: {}", err);
            }
        });

        self.group.fail(cause);
        self.group.close();
    }

    /// Send this attempt's BEGIN statement. A failure rolls back with the
    /// BEGIN error as cause.
    pub(crate) fn send_begin(&self) -> QueryHandle {
        self.dispatch(
            self.options.begin_statement(),
            Vec::new(),
            FailurePolicy::Rollback,
        )
    }

    fn check_open(&self) -> Result<(), TransactionError> {
        let state = self.status.lock();
        match state.status {
            CommitStatus::Pending => Ok(()),
            status => Err(TransactionError::TransactionClosed(status)),
        }
    }

    /// Move to a terminal status. Returns false if the attempt already
    /// resolved; a terminal status is never overwritten.
    fn transition(&self, to: CommitStatus) -> bool {
        let mut state = self.status.lock();
        if state.status != CommitStatus::Pending {
            return false;
        }
        state.status = to;
        true
    }

    fn send(&self, sql: String, params: Vec<SqlValue>) -> QueryCompletion {
        self.tracer.statement(&sql, &params);
        self.connection.send_query(sql, params)
    }

    /// Register with the completion group, put the statement on the wire,
    /// and hand completion handling to a watcher task.
    fn dispatch(&self, sql: String, params: Vec<SqlValue>, policy: FailurePolicy) -> QueryHandle {
        let member = self.group.add();
        let completion = self.send(sql, params);
        let (tx, rx) = oneshot::channel();
        let txn = self.clone();
        tokio::spawn(async move {
            let outcome = match completion.await {
                Ok(Ok(result)) => {
                    member.succeed();
                    Ok(result)
                }
                Ok(Err(err)) => {
                    let err = TransactionError::Query(err);
                    txn.settle_failed(member, policy, err.clone());
                    Err(err)
                }
                Err(_) => {
                    let err = TransactionError::ConnectionClosed;
                    txn.settle_failed(member, policy, err.clone());
                    Err(err)
                }
            };
            let _ = tx.send(outcome);
        });
        QueryHandle::new(rx)
    }

    fn settle_failed(&self, member: GroupMember, policy: FailurePolicy, err: TransactionError) {
        let roll_back = match policy {
            FailurePolicy::Rollback => true,
            FailurePolicy::Auto => self.auto_rollback.load(Ordering::SeqCst),
        };
        if roll_back {
            // rollback fails the group with the cause and puts ROLLBACK on
            // the wire before the aggregate signal resolves
            self.rollback(err.clone());
            member.fail(err);
        } else {
            // the error travels on the per-query handle only; the member
            // settles so a later COMMIT can still resolve the group
            member.succeed();
        }
    }

    fn finish_failed_commit(&self, member: GroupMember, err: TransactionError) {
        if self.transition(CommitStatus::RolledBack) {
            member.fail(err);
            self.group.close();
        }
    }
}
