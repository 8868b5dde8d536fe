//! Completion aggregation for in-flight operations
//!
//! A [`CompletionGroup`] tracks an open-ended set of asynchronous
//! operations whose size is not known up front. Members may be added at
//! any point before the group is closed, including from the completion
//! path of another member. The group resolves exactly once:
//!
//! - success, after [`CompletionGroup::close`] has been called, every
//!   member has succeeded, and none remain outstanding;
//! - failure, immediately when any member fails (or the owner fails the
//!   group directly), even before close. Later member outcomes only
//!   settle bookkeeping and are ignored for the aggregate signal.

use crate::error::TransactionError;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

struct GroupState {
    /// Members registered but not yet settled
    outstanding: usize,

    /// No further members will be added
    closed: bool,

    /// Unsent half of the aggregate signal; `None` once resolved
    signal: Option<oneshot::Sender<Result<(), TransactionError>>>,
}

impl GroupState {
    fn resolve(&mut self, outcome: Result<(), TransactionError>) {
        if let Some(signal) = self.signal.take() {
            let _ = signal.send(outcome);
        }
    }

    fn maybe_succeed(&mut self) {
        if self.closed && self.outstanding == 0 {
            self.resolve(Ok(()));
        }
    }
}

/// Fan-in primitive aggregating member outcomes into one signal
#[derive(Clone)]
pub struct CompletionGroup {
    state: Arc<Mutex<GroupState>>,
}

impl CompletionGroup {
    /// Create a group and the future resolving with its aggregate outcome.
    pub fn new() -> (Self, GroupOutcome) {
        let (signal, rx) = oneshot::channel();
        let group = Self {
            state: Arc::new(Mutex::new(GroupState {
                outstanding: 0,
                closed: false,
                signal: Some(signal),
            })),
        };
        (group, GroupOutcome { rx })
    }

    /// Register a new pending member operation.
    ///
    /// Valid at any point before [`close`](Self::close), including from
    /// within another member's completion path.
    pub fn add(&self) -> GroupMember {
        let mut state = self.state.lock();
        state.outstanding += 1;
        GroupMember {
            state: self.state.clone(),
        }
    }

    /// Declare that no further members will be added.
    ///
    /// Called exactly once by the owner. If every registered member has
    /// already succeeded, the aggregate success signal fires inside this
    /// call.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.maybe_succeed();
    }

    /// Fail the group directly with `err`.
    ///
    /// Used by the owner for failures that do not originate from a member
    /// (rollback causes). First failure wins; anything after is ignored.
    pub fn fail(&self, err: TransactionError) {
        self.state.lock().resolve(Err(err));
    }
}

/// One pending member operation
///
/// Settled by value with [`succeed`](Self::succeed) or
/// [`fail`](Self::fail). A member dropped without settling leaves the
/// group outstanding indefinitely, the same way a query that never
/// completes leaves its transaction unresolved.
pub struct GroupMember {
    state: Arc<Mutex<GroupState>>,
}

impl GroupMember {
    /// Settle this member as succeeded.
    pub fn succeed(self) {
        let mut state = self.state.lock();
        state.outstanding -= 1;
        state.maybe_succeed();
    }

    /// Settle this member as failed, failing the group if it has not
    /// already resolved.
    pub fn fail(self, err: TransactionError) {
        let mut state = self.state.lock();
        state.outstanding -= 1;
        state.resolve(Err(err));
    }
}

/// Future resolving once with the group's aggregate outcome
pub struct GroupOutcome {
    rx: oneshot::Receiver<Result<(), TransactionError>>,
}

impl Future for GroupOutcome {
    type Output = Result<(), TransactionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| match res {
            Ok(outcome) => outcome,
            Err(_) => Err(TransactionError::ConnectionClosed),
        })
    }
}
