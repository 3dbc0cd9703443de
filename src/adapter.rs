//! Adapts a pinned [`PooledConnection`] to the [`XaResource`] contract a
//! [`crate::transaction::Transaction`] drives through commit/rollback.

use std::sync::{Arc, Mutex, Weak};

use crate::branch::BranchId;
use crate::connection::PooledConnection;
use crate::driver::Driver;
use crate::error::{PoolError, ResourceError};
use crate::pool::PoolShared;
use crate::resource::{EndFlag, StartFlag, Vote, XaResource};

/// One per connection enlisted in a transaction. The connection itself stays
/// shared with the application's own handle via `Arc<Mutex<_>>`; this
/// adapter only locks it long enough to drive commit/rollback, then drops
/// the pool's transaction-affinity entry. The connection returns to the idle
/// set on its own, via `PooledConnection`'s `Drop` impl, once every `Arc`
/// clone — the pool's and the application's — has gone.
pub struct ResourceAdapter<D: Driver> {
    conn_id: u64,
    tx_id: u64,
    conn: Arc<Mutex<PooledConnection<D>>>,
    pool: Weak<PoolShared<D>>,
}

impl<D: Driver> ResourceAdapter<D> {
    pub(crate) fn new(
        conn_id: u64,
        tx_id: u64,
        conn: Arc<Mutex<PooledConnection<D>>>,
        pool: Weak<PoolShared<D>>,
    ) -> Self {
        Self {
            conn_id,
            tx_id,
            conn,
            pool,
        }
    }

    /// Runs `op` (the driver commit/rollback call) against the pinned
    /// connection. The unpin/restore-autocommit/return-to-idle tail only
    /// runs when `op` succeeds, or when `always_release` is set — a failed
    /// commit must leave the connection pinned so the coordinator's
    /// compensating `rollback()` call is the one that actually releases it.
    fn finish(
        &mut self,
        op: impl FnOnce(&mut PooledConnection<D>) -> Result<(), PoolError>,
        always_release: bool,
    ) -> Result<(), ResourceError> {
        let (result, release) = {
            let mut guard = self.conn.lock().unwrap();
            let r = op(&mut guard);
            if r.is_err() {
                guard.mark_invalid();
            }
            let release = always_release || r.is_ok();
            if release {
                if let Err(e) = guard.set_auto_commit_internal(true) {
                    tracing::warn!(conn_id = self.conn_id, error = %e, "failed to restore auto-commit after completion");
                }
                guard.clear_pin();
            }
            (r, release)
        };
        if release {
            if let Some(pool) = self.pool.upgrade() {
                pool.remove_pinned(self.tx_id);
            }
        }
        result.map_err(|e| Box::new(e) as ResourceError)
    }
}

impl<D: Driver> XaResource for ResourceAdapter<D> {
    fn resource_key(&self) -> u64 {
        self.conn_id
    }

    fn start(&mut self, _branch: BranchId, _flag: StartFlag) -> Result<(), ResourceError> {
        // Presence in the transaction's resource map is the binding; the
        // connection was already switched to explicit-transaction mode when
        // it was pinned, before enlistment.
        Ok(())
    }

    fn end(&mut self, _branch: BranchId, _flag: EndFlag) -> Result<(), ResourceError> {
        Ok(())
    }

    fn commit(&mut self, _branch: BranchId, _one_phase: bool) -> Result<(), ResourceError> {
        self.finish(PooledConnection::driver_commit, false)
    }

    fn rollback(&mut self, _branch: BranchId) -> Result<(), ResourceError> {
        self.finish(PooledConnection::driver_rollback, true)
    }

    fn prepare(&mut self, _branch: BranchId) -> Result<Vote, ResourceError> {
        // One-phase commit only; a real prepare vote is never solicited.
        Ok(Vote::ReadOnly)
    }
}
