//! Statement tracing hooks
//!
//! Every statement the coordinator sends can be emitted to an injected
//! trace sink. Tracing has no effect on control flow; the default sink
//! discards everything.

use crate::value::SqlValue;

/// Sink for statements as they are put on the wire
pub trait QueryTracer: Send + Sync {
    /// Called with each statement and its parameter values, immediately
    /// before submission.
    fn statement(&self, sql: &str, params: &[SqlValue]);
}

/// Tracer that discards everything (the default)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl QueryTracer for NoopTracer {
    fn statement(&self, _sql: &str, _params: &[SqlValue]) {}
}

/// Tracer emitting each statement at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl QueryTracer for LogTracer {
    fn statement(&self, sql: &str, params: &[SqlValue]) {
        if params.is_empty() {
            tracing::debug!("{}", sql);
        } else {
            let rendered: Vec<String> = params.iter().map(|v| v.to_string()).collect();
            tracing::debug!("{} [{}]", sql, rendered.join(", "));
        }
    }
}
