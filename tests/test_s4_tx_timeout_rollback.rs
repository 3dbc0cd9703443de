mod common;

use common::{clear_thread_transaction, datasource};
use pooled_datasource::{TransactionCoordinator, TxErrorKind};
use std::time::Duration;

#[test]
fn commit_after_transaction_timeout_rolls_back() {
    clear_thread_transaction();
    let ds = datasource(2, Duration::from_secs(2), Duration::from_secs(60));
    let coordinator = TransactionCoordinator::global();

    coordinator.set_transaction_timeout(1).unwrap();
    coordinator.begin().unwrap();

    let mut conn = ds.get_connection().unwrap();
    conn.execute("CREATE TABLE t (v INTEGER)").unwrap();
    drop(conn);

    std::thread::sleep(Duration::from_millis(1100));

    let err = coordinator.commit().unwrap_err();
    assert_eq!(err.kind(), TxErrorKind::Timeout);
    assert!(coordinator.transaction().is_none(), "commit must clear the thread binding even on failure");

    coordinator.set_transaction_timeout(0).unwrap();
}
