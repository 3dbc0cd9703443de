//! The pooled connection wrapper: a raw driver connection plus the
//! bookkeeping ([`ConnectionPool`](crate::pool::ConnectionPool) back-reference,
//! last-access time, transaction pin, invalidate flag) the pool needs to
//! decide what to do with it when it comes back.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Instant;

use crate::driver::Driver;
use crate::error::PoolError;
use crate::pool::PoolShared;

/// A connection on loan from a [`crate::pool::ConnectionPool`].
///
/// Dropping a `PooledConnection` that still holds its raw handle returns it
/// to the pool exactly as an explicit [`PooledConnection::close`] would —
/// `close()` exists mainly so call sites can signal intent.
pub struct PooledConnection<D: Driver> {
    pub(crate) id: u64,
    pub(crate) raw: Option<D::Raw>,
    last_access: Instant,
    pub(crate) pool: Weak<PoolShared<D>>,
    pinned_tx: Option<u64>,
    pub(crate) invalidate: bool,
}

impl<D: Driver> fmt::Debug for PooledConnection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("has_raw", &self.raw.is_some())
            .field("pinned_tx", &self.pinned_tx)
            .field("invalidate", &self.invalidate)
            .finish()
    }
}

impl<D: Driver> PooledConnection<D> {
    pub(crate) fn new(id: u64, raw: D::Raw, pool: Weak<PoolShared<D>>) -> Self {
        Self {
            id,
            raw: Some(raw),
            last_access: Instant::now(),
            pool,
            pinned_tx: None,
            invalidate: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub(crate) fn last_access(&self) -> Instant {
        self.last_access
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_access = now;
    }

    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned_tx.is_some()
    }

    pub(crate) fn pin(&mut self, tx_id: u64) {
        self.pinned_tx = Some(tx_id);
    }

    pub(crate) fn clear_pin(&mut self) {
        self.pinned_tx = None;
    }

    fn with_driver_raw<R>(&mut self, f: impl FnOnce(&D, &mut D::Raw) -> Result<R, PoolError>) -> Result<R, PoolError> {
        let pool = self.pool.upgrade().ok_or(PoolError::Closed)?;
        let raw = self.raw.as_mut().expect("connection handle already consumed");
        f(&pool.driver, raw)
    }

    pub fn execute_batch(&mut self, sql: &str) -> Result<(), PoolError> {
        self.with_driver_raw(|driver, raw| driver.execute_batch(raw, sql))
    }

    pub fn query_scalar_i64(&mut self, sql: &str) -> Result<i64, PoolError> {
        self.with_driver_raw(|driver, raw| driver.query_scalar_i64(raw, sql))
    }

    /// Blocked while enlisted in a transaction — see the crate-level design
    /// note on auto-commit being the pool's own affinity bookkeeping, not a
    /// knob applications can turn while a transaction owns the connection.
    pub fn set_auto_commit(&mut self, enabled: bool) -> Result<(), PoolError> {
        if self.pinned_tx.is_some() {
            return Err(PoolError::InvalidOperation(
                "cannot change auto-commit mode while enlisted in a transaction".into(),
            ));
        }
        self.set_auto_commit_internal(enabled)
    }

    pub(crate) fn set_auto_commit_internal(&mut self, enabled: bool) -> Result<(), PoolError> {
        self.with_driver_raw(|driver, raw| driver.set_auto_commit(raw, enabled))
    }

    pub(crate) fn driver_commit(&mut self) -> Result<(), PoolError> {
        self.with_driver_raw(|driver, raw| driver.commit(raw))
    }

    pub(crate) fn driver_rollback(&mut self) -> Result<(), PoolError> {
        self.with_driver_raw(|driver, raw| driver.rollback(raw))
    }

    /// Marks the connection broken; it will be destroyed, not pooled, at its
    /// next release.
    pub fn mark_invalid(&mut self) {
        self.invalidate = true;
    }

    /// Equivalent to letting the handle drop; kept as an explicit call for
    /// readability at call sites.
    pub fn close(self) {
        drop(self);
    }
}

impl<D: Driver> Drop for PooledConnection<D> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            if let Some(pool) = self.pool.upgrade() {
                pool.return_or_destroy(self.id, raw, self.invalidate);
            }
            // else: pool is already gone; `raw`'s own Drop impl (if any)
            // runs when this function returns. The driver's `close` hook is
            // skipped in that case — best effort only.
        }
    }
}
