//! The public facade: `get_connection()` plus a read-only management
//! readout, gluing the pool and the transaction coordinator together.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::adapter::ResourceAdapter;
use crate::coordinator::TransactionCoordinator;
use crate::driver::{ConnectionProperties, Driver};
use crate::error::Error;
use crate::pool::{ConnectionPool, PoolConfig};

/// A connection handed out by [`DataSource::get_connection`]. `Owned` when
/// no transaction was bound to the calling thread; `Shared` when it has been
/// pinned to one, in which case it may be the same underlying connection
/// another `get_connection()` call on the same thread already received.
pub enum Connection<D: Driver> {
    Owned(crate::connection::PooledConnection<D>),
    Shared(Arc<Mutex<crate::connection::PooledConnection<D>>>),
}

impl<D: Driver> fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned(c) => f.debug_tuple("Owned").field(c).finish(),
            Self::Shared(c) => f
                .debug_tuple("Shared")
                .field(&c.lock().unwrap())
                .finish(),
        }
    }
}

impl<D: Driver> Connection<D> {
    /// Runs `sql` against the underlying connection, regardless of whether
    /// this handle owns it outright or shares it with the pool's
    /// transaction-affinity table.
    pub fn execute(&mut self, sql: &str) -> Result<(), crate::error::PoolError> {
        match self {
            Self::Owned(c) => c.execute_batch(sql),
            Self::Shared(c) => c.lock().unwrap().execute_batch(sql),
        }
    }

    pub fn query_scalar_i64(&mut self, sql: &str) -> Result<i64, crate::error::PoolError> {
        match self {
            Self::Owned(c) => c.query_scalar_i64(sql),
            Self::Shared(c) => c.lock().unwrap().query_scalar_i64(sql),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        match self {
            Self::Owned(c) => c.id(),
            Self::Shared(c) => c.lock().unwrap().id(),
        }
    }

    /// Whether `self` and `other` are handles to the same underlying
    /// connection — the Rust analogue of Java object identity here, since
    /// transaction-pinned connections are shared via `Arc`.
    #[must_use]
    pub fn is_same_connection(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Shared(a), Self::Shared(b)) => Arc::ptr_eq(a, b),
            (Self::Owned(a), Self::Owned(b)) => a.id() == b.id(),
            _ => false,
        }
    }

    pub fn close(self) {
        drop(self);
    }
}

/// Read-only pool counters, the facade's "management readout" surface.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub url: String,
    pub open_count: u32,
    pub idle_count: u32,
    pub active_transaction_count: u32,
    pub max_size: u32,
    pub borrow_timeout: Duration,
    pub lock_timeout: i64,
}

/// Wraps a [`ConnectionPool`] and the process-wide [`TransactionCoordinator`],
/// giving callers one `get_connection()` that transparently reuses the
/// calling thread's pinned connection when a transaction is active.
pub struct DataSource<D: Driver> {
    pool: ConnectionPool<D>,
    url: String,
}

impl<D: Driver> DataSource<D> {
    pub fn new(driver: D, props: ConnectionProperties, config: PoolConfig) -> Self {
        let url = props.url.clone();
        Self {
            pool: ConnectionPool::new(driver, props, config),
            url,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &ConnectionPool<D> {
        &self.pool
    }

    /// If a transaction is bound to the calling thread, returns its pinned
    /// connection (enlisting a freshly borrowed one on first call); otherwise
    /// returns a plain borrow from the pool.
    pub fn get_connection(&self) -> Result<Connection<D>, Error> {
        let coordinator = TransactionCoordinator::global();
        let Some(tx) = coordinator.transaction() else {
            return Ok(Connection::Owned(self.pool.get_connection()?));
        };

        let tx_id = tx.global_id();
        if let Some(shared) = self.pool.shared.get_pinned(tx_id) {
            tracing::debug!(tx_id, "reusing connection already pinned to this transaction");
            return Ok(Connection::Shared(shared));
        }

        let mut owned = self.pool.get_connection()?;
        let conn_id = owned.id();
        owned.set_auto_commit_internal(false)?;
        owned.pin(tx_id);
        let shared = Arc::new(Mutex::new(owned));

        let adapter = ResourceAdapter::new(conn_id, tx_id, Arc::clone(&shared), Arc::downgrade(&self.pool.shared));
        match tx.enlist(Box::new(adapter)) {
            Ok(_) => {
                self.pool.shared.insert_pinned(tx_id, Arc::clone(&shared));
                tracing::debug!(tx_id, conn_id, "enlisted freshly borrowed connection");
                Ok(Connection::Shared(shared))
            }
            Err(e) => {
                // Undo the pin and hand the connection straight back to the
                // pool; the transaction never took ownership of it.
                let mut guard = shared.lock().unwrap();
                guard.clear_pin();
                let _ = guard.set_auto_commit_internal(true);
                drop(guard);
                drop(shared);
                tracing::warn!(tx_id, conn_id, error = %e, "enlist failed; connection released");
                Err(e.into())
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            url: self.url.clone(),
            open_count: self.pool.open_count(),
            idle_count: self.pool.idle_count(),
            active_transaction_count: self.pool.active_transaction_count(),
            max_size: self.pool.config().pool_size,
            borrow_timeout: self.pool.config().borrow_timeout,
            lock_timeout: self.pool.config().lock_timeout,
        }
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}
