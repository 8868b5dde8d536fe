//! Chained inserts in one serializable transaction, with a scripted
//! conflict on the first attempt to show the transparent retry.
//!
//! Run with: cargo run --example chained_inserts

use pg_coordinator::{
    Coordinator, IsolationLevel, LogTracer, MockConnection, QueryError, SqlValue,
    TransactionOptions,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> pg_coordinator::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let connection = Arc::new(MockConnection::new());
    // the middle insert conflicts once, then answers late on the retry;
    // rules are consulted in insertion order, so the one-shot failure
    // comes first
    connection.fail_next_matching(
        "wombat",
        QueryError::serialization_failure("could not serialize access due to concurrent update"),
    );
    connection.delay_matching("wombat", Duration::from_millis(25));

    let coordinator = Coordinator::with_tracer(connection.clone(), Arc::new(LogTracer));
    let options = TransactionOptions::new()
        .isolation(IsolationLevel::Serializable)
        .retry(true);

    coordinator
        .begin_transaction(options, |txn| async move {
            txn.insert("pets", &[("name", SqlValue::from("bar"))])?.await?;
            txn.insert("pets", &[("name", SqlValue::from("wombat"))])?
                .await?;
            txn.insert("pets", &[("name", SqlValue::from("quux"))])?.await?;
            txn.commit();
            Ok(())
        })
        .await?;

    println!("wire log:");
    for statement in connection.wire_log() {
        println!("  {}", statement);
    }
    Ok(())
}
