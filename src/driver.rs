//! The pluggable raw-connection factory a [`crate::pool::ConnectionPool`]
//! borrows from, plus the one reference implementation (`sqlite`) used to
//! exercise the pool and coordinator in tests without a network database.

use crate::error::PoolError;

/// Connection parameters assembled from the configuration keys in
/// [`crate::config`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionProperties {
    pub url: String,
    pub user: String,
    pub password: String,
}

/// A raw-connection factory. `Raw` is whatever the backing driver crate
/// calls a connection; the pool never interprets it, only opens, closes, and
/// hands it to a [`crate::adapter::ResourceAdapter`] for commit/rollback.
pub trait Driver: Send + Sync + 'static {
    type Raw: Send;

    fn connect(&self, props: &ConnectionProperties) -> Result<Self::Raw, PoolError>;

    /// Sets a driver-native lock/busy timeout. Failures here are logged and
    /// swallowed by the caller, not propagated, per the configuration design.
    fn set_lock_timeout(&self, raw: &mut Self::Raw, lock_timeout_ms: i64) -> Result<(), PoolError>;

    /// Cheap liveness probe the pool runs before handing an idle connection
    /// back out, independent of any commit/rollback outcome.
    fn is_broken(&self, raw: &Self::Raw) -> bool;

    /// Opens or closes an explicit transaction block, the raw-level analogue
    /// of JDBC `setAutoCommit(false)`/`setAutoCommit(true)`.
    fn set_auto_commit(&self, raw: &mut Self::Raw, enabled: bool) -> Result<(), PoolError>;

    fn commit(&self, raw: &mut Self::Raw) -> Result<(), PoolError>;
    fn rollback(&self, raw: &mut Self::Raw) -> Result<(), PoolError>;

    fn execute_batch(&self, raw: &mut Self::Raw, sql: &str) -> Result<(), PoolError>;
    fn query_scalar_i64(&self, raw: &mut Self::Raw, sql: &str) -> Result<i64, PoolError>;

    fn close(&self, raw: Self::Raw);
}

#[cfg(feature = "sqlite")]
pub use sqlite_driver::SqliteDriver;

#[cfg(feature = "sqlite")]
mod sqlite_driver {
    use super::{ConnectionProperties, Driver};
    use crate::error::PoolError;
    use std::time::Duration;

    /// `rusqlite`-backed [`Driver`]. `url` of `""` or `":memory:"` opens an
    /// in-memory database; anything else opens (and creates, if needed) a
    /// file-backed one.
    #[derive(Debug, Default)]
    pub struct SqliteDriver;

    impl Driver for SqliteDriver {
        type Raw = rusqlite::Connection;

        fn connect(&self, props: &ConnectionProperties) -> Result<Self::Raw, PoolError> {
            let conn = if props.url.is_empty() || props.url == ":memory:" {
                rusqlite::Connection::open_in_memory()
            } else {
                rusqlite::Connection::open(&props.url)
            }
            .map_err(|e| PoolError::Driver(Box::new(e)))?;
            Ok(conn)
        }

        fn set_lock_timeout(&self, raw: &mut Self::Raw, lock_timeout_ms: i64) -> Result<(), PoolError> {
            let ms = lock_timeout_ms.max(0) as u64;
            raw.busy_timeout(Duration::from_millis(ms))
                .map_err(|e| PoolError::Driver(Box::new(e)))
        }

        /// An idle connection should always be back in autocommit mode
        /// (`commit`/`rollback` restore it); if it isn't, something left a
        /// transaction open on it and it can't be trusted. A trivial query
        /// additionally catches a connection whose socket/file handle has
        /// gone bad underneath it.
        fn is_broken(&self, raw: &Self::Raw) -> bool {
            !raw.is_autocommit() || raw.execute_batch("SELECT 1").is_err()
        }

        fn set_auto_commit(&self, raw: &mut Self::Raw, enabled: bool) -> Result<(), PoolError> {
            if enabled {
                // SQLite returns to implicit autocommit on its own once the
                // explicit transaction opened below has been committed or
                // rolled back; nothing to do here.
                Ok(())
            } else {
                self.execute_batch(raw, "BEGIN")
            }
        }

        fn commit(&self, raw: &mut Self::Raw) -> Result<(), PoolError> {
            self.execute_batch(raw, "COMMIT")
        }

        fn rollback(&self, raw: &mut Self::Raw) -> Result<(), PoolError> {
            self.execute_batch(raw, "ROLLBACK")
        }

        fn execute_batch(&self, raw: &mut Self::Raw, sql: &str) -> Result<(), PoolError> {
            raw.execute_batch(sql).map_err(|e| PoolError::Driver(Box::new(e)))
        }

        fn query_scalar_i64(&self, raw: &mut Self::Raw, sql: &str) -> Result<i64, PoolError> {
            raw.query_row(sql, [], |row| row.get(0))
                .map_err(|e| PoolError::Driver(Box::new(e)))
        }

        fn close(&self, raw: Self::Raw) {
            let _ = raw.close();
        }
    }
}
