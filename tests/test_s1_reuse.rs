mod common;

use common::{clear_thread_transaction, datasource};
use pooled_datasource::TransactionCoordinator;
use std::time::Duration;

#[test]
fn same_transaction_reuses_connection_and_commit_persists() {
    clear_thread_transaction();
    let ds = datasource(2, Duration::from_secs(2), Duration::from_secs(60));
    let coordinator = TransactionCoordinator::global();
    coordinator.begin().unwrap();

    let mut first = ds.get_connection().unwrap();
    first.execute("CREATE TABLE t (v INTEGER)").unwrap();
    first.execute("INSERT INTO t VALUES (1)").unwrap();

    let second = ds.get_connection().unwrap();
    assert!(first.is_same_connection(&second), "repeated get_connection() in the same transaction must return the same connection");
    assert_eq!(ds.stats().active_transaction_count, 1);

    drop(second);
    drop(first);
    coordinator.commit().unwrap();
    assert_eq!(ds.stats().active_transaction_count, 0);
    assert_eq!(ds.stats().idle_count, 1, "the committed connection must return to the idle set");

    let mut after_commit = ds.get_connection().unwrap();
    let count = after_commit.query_scalar_i64("SELECT COUNT(*) FROM t").unwrap();
    assert_eq!(count, 1, "committed write must be visible once the connection returns to the idle set");
}
