//! Scripted in-process connection
//!
//! A mock connection that follows the production connection contract:
//! statements are recorded in wire order at submission time, completions
//! are delivered later from spawned tasks, optionally delayed or failed
//! according to scripted rules. Used by the crate's own tests and demos,
//! and usable by downstream code testing transaction logic without a
//! server.

use crate::connection::{Connection, QueryCompletion, QueryResult};
use crate::error::QueryError;
use crate::value::SqlValue;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

/// One statement as it was put on the wire
#[derive(Debug, Clone)]
pub struct SentStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SentStatement {
    fn matches(&self, pattern: &str) -> bool {
        self.sql.contains(pattern)
            || self
                .params
                .iter()
                .any(|value| value.to_string().contains(pattern))
    }
}

#[derive(Clone)]
enum Response {
    Succeed(QueryResult),
    Fail(QueryError),
}

struct Rule {
    /// Substring matched against the statement text or a rendered
    /// parameter value
    pattern: String,
    /// How many more statements this rule applies to; `None` is unlimited
    remaining: Option<u32>,
    /// Delay before the completion is delivered
    delay: Option<Duration>,
    response: Response,
}

/// Mock connection with a wire log and scripted completions
///
/// Statements with no matching rule succeed with an empty result. Rules
/// are consulted in the order they were added; the first match with
/// budget left wins.
#[derive(Default)]
pub struct MockConnection {
    statements: Mutex<Vec<SentStatement>>,
    rules: Mutex<Vec<Rule>>,
}

impl MockConnection {
    /// Create a mock connection that succeeds every statement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement containing `pattern`.
    pub fn fail_matching(&self, pattern: impl Into<String>, error: QueryError) {
        self.push_rule(pattern.into(), None, None, Response::Fail(error));
    }

    /// Fail only the next statement containing `pattern`; later matches
    /// fall through to other rules or the default success.
    pub fn fail_next_matching(&self, pattern: impl Into<String>, error: QueryError) {
        self.push_rule(pattern.into(), Some(1), None, Response::Fail(error));
    }

    /// Answer statements containing `pattern` with `result`.
    pub fn respond_matching(&self, pattern: impl Into<String>, result: QueryResult) {
        self.push_rule(pattern.into(), None, None, Response::Succeed(result));
    }

    /// Delay the (successful) completion of statements containing
    /// `pattern`. Submission order is unaffected; only the completion is
    /// late.
    pub fn delay_matching(&self, pattern: impl Into<String>, delay: Duration) {
        self.push_rule(
            pattern.into(),
            None,
            Some(delay),
            Response::Succeed(QueryResult::default()),
        );
    }

    /// Everything sent so far, in wire order.
    pub fn statements(&self) -> Vec<SentStatement> {
        self.statements.lock().clone()
    }

    /// The statement texts sent so far, in wire order.
    pub fn wire_log(&self) -> Vec<String> {
        self.statements
            .lock()
            .iter()
            .map(|stmt| stmt.sql.clone())
            .collect()
    }

    fn push_rule(
        &self,
        pattern: String,
        remaining: Option<u32>,
        delay: Option<Duration>,
        response: Response,
    ) {
        self.rules.lock().push(Rule {
            pattern,
            remaining,
            delay,
            response,
        });
    }

    fn script_for(&self, statement: &SentStatement) -> (Response, Option<Duration>) {
        let mut rules = self.rules.lock();
        let hit = rules
            .iter_mut()
            .find(|rule| statement.matches(&rule.pattern) && rule.remaining.map_or(true, |n| n > 0));
        match hit {
            Some(rule) => {
                if let Some(n) = rule.remaining.as_mut() {
                    *n -= 1;
                }
                (rule.response.clone(), rule.delay)
            }
            None => (Response::Succeed(QueryResult::default()), None),
        }
    }
}

impl Connection for MockConnection {
    fn send_query(&self, sql: String, params: Vec<SqlValue>) -> QueryCompletion {
        let statement = SentStatement { sql, params };
        let (script, delay) = self.script_for(&statement);
        self.statements.lock().push(statement);

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let outcome = match script {
                Response::Succeed(result) => Ok(result),
                Response::Fail(error) => Err(error),
            };
            let _ = tx.send(outcome);
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_statements_in_submission_order() {
        let conn = MockConnection::new();
        let first = conn.send_query("BEGIN".to_string(), Vec::new());
        let second = conn.send_query("COMMIT".to_string(), Vec::new());
        assert_eq!(conn.wire_log(), vec!["BEGIN", "COMMIT"]);
        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn fail_next_matching_consumes_its_budget() {
        let conn = MockConnection::new();
        conn.fail_next_matching("INSERT", QueryError::serialization_failure("conflict"));

        let first = conn
            .send_query("INSERT INTO \"t\"".to_string(), Vec::new())
            .await
            .unwrap();
        assert!(first.unwrap_err().is_serialization_failure());

        let second = conn
            .send_query("INSERT INTO \"t\"".to_string(), Vec::new())
            .await
            .unwrap();
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn delayed_completion_preserves_submission_order() {
        let conn = MockConnection::new();
        conn.delay_matching("slow", Duration::from_millis(20));
        let slow = conn.send_query("SELECT 'slow'".to_string(), Vec::new());
        let fast = conn.send_query("SELECT 'fast'".to_string(), Vec::new());
        // the fast statement completes first even though it was sent second
        assert!(fast.await.unwrap().is_ok());
        assert!(slow.await.unwrap().is_ok());
        assert_eq!(conn.wire_log(), vec!["SELECT 'slow'", "SELECT 'fast'"]);
    }
}
