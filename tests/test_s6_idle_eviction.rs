mod common;

use common::{clear_thread_transaction, datasource};
use std::time::Duration;

#[test]
fn idle_connections_past_keep_alive_are_evicted() {
    clear_thread_transaction();
    let ds = datasource(2, Duration::from_secs(2), Duration::from_millis(200));

    let conn = ds.get_connection().unwrap();
    assert_eq!(ds.pool().open_count(), 1);
    drop(conn);
    assert_eq!(ds.pool().idle_count(), 1);

    std::thread::sleep(Duration::from_millis(350));

    // the sweep runs opportunistically at the top of get_connection(); this
    // borrow should find the idle connection expired, destroy it, and open
    // a fresh one rather than reuse it.
    let fresh = ds.get_connection().unwrap();
    assert_eq!(ds.pool().open_count(), 1, "expired connection destroyed, exactly one fresh one opened");
    drop(fresh);
}
