use std::time::Duration;

use pooled_datasource::{
    ConnectionProperties, DataSource, PoolConfigBuilder, SqliteDriver, TransactionCoordinator,
};

/// Turns on `tracing` output for local debugging (`RUST_LOG=debug cargo
/// test -- --nocapture`); a no-op once another test in the same process has
/// already installed a subscriber.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
}

/// An in-memory `SqliteDriver` datasource with a small pool, meant for tests
/// that want to exhaust capacity quickly. Each connection gets its own
/// private in-memory database (SQLite's default for `":memory:"`), so tests
/// assert on pool *mechanics* (reuse, timeouts, eviction), not on shared
/// table state across connections.
pub fn datasource(pool_size: u32, borrow_timeout: Duration, keep_alive: Duration) -> DataSource<SqliteDriver> {
    init_tracing();
    let config = PoolConfigBuilder::new()
        .pool_size(pool_size)
        .borrow_timeout(borrow_timeout)
        .keep_alive(keep_alive)
        .finish()
        .unwrap();
    DataSource::new(SqliteDriver, ConnectionProperties::default(), config)
}

/// Clears any transaction left bound to the current thread by a previous
/// test sharing the same OS thread (the coordinator's association is
/// thread-local, not test-local).
pub fn clear_thread_transaction() {
    let c = TransactionCoordinator::global();
    if c.transaction().is_some() {
        let _ = c.rollback();
    }
}
