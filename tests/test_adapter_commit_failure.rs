mod common;

use common::{clear_thread_transaction, datasource};
use pooled_datasource::{TransactionCoordinator, TxErrorKind};
use std::time::Duration;

/// Drives a commit failure through the real `ResourceAdapter` +
/// `SqliteDriver` path (not a hand-written `XaResource` mock): issuing a
/// stray `COMMIT` on the pinned connection before the coordinator's own
/// commit ends the SQL-level transaction early, so the driver's real
/// `COMMIT` call fails with "no transaction is active". The connection must
/// stay pinned through that failure and only unpin/return-or-destroy during
/// the compensating rollback, and since it was marked invalid it must be
/// destroyed rather than pooled.
#[test]
fn failed_driver_commit_leaves_connection_pinned_until_compensating_rollback() {
    clear_thread_transaction();
    let ds = datasource(1, Duration::from_secs(2), Duration::from_secs(60));
    let coordinator = TransactionCoordinator::global();
    coordinator.begin().unwrap();

    let mut conn = ds.get_connection().unwrap();
    conn.execute("CREATE TABLE t (v INTEGER)").unwrap();
    conn.execute("COMMIT").unwrap();
    drop(conn);

    let err = coordinator.commit().unwrap_err();
    assert_eq!(err.kind(), TxErrorKind::System);
    assert!(coordinator.transaction().is_none());

    assert_eq!(
        ds.pool().open_count(),
        0,
        "a connection invalidated by a failed commit must be destroyed, not returned to idle"
    );

    let fresh = ds.get_connection().unwrap();
    assert_eq!(ds.pool().open_count(), 1);
    drop(fresh);
}
