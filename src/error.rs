//! Error taxonomy for the pool and the transaction coordinator.
//!
//! Two enums, one per subsystem, rather than a single catch-all: pool failures
//! ([`PoolError`]) are about capacity and I/O, transaction failures
//! ([`TxError`]) are about the commit/rollback state machine. [`Error`]
//! unifies the two for call sites — [`crate::DataSource::get_connection`] —
//! that can fail either way.

use crate::transaction::CoordinatorStatus;
use std::fmt;

/// A boxed error raised by a resource ([`crate::resource::XaResource`]) or a
/// [`crate::driver::Driver`], re-raised by the transaction as [`TxError::System`].
pub type ResourceError = Box<dyn std::error::Error + Send + Sync>;

/// A plain string wrapped as a [`std::error::Error`], for spots that need to
/// synthesize a `ResourceError` without a genuine driver/resource failure
/// underneath (e.g. a negative timeout passed to the coordinator).
#[derive(Debug)]
pub(crate) struct Msg(pub(crate) String);

impl fmt::Display for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Msg {}

/// Errors raised by [`crate::pool::ConnectionPool`] and by
/// [`crate::connection::PooledConnection`] facade operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Raised during pool construction from a bad configuration key/value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Borrow attempted after [`crate::pool::ConnectionPool::shutdown`].
    #[error("pool closed")]
    Closed,

    /// A borrow waited the full `borrow-timeout` without obtaining a connection.
    #[error("timed out waiting {waited_ms}ms for a connection (limit {limit_ms}ms)")]
    BorrowTimeout { waited_ms: u64, limit_ms: u64 },

    /// A blocked borrower was interrupted via `interrupt_waiters`.
    #[error("borrow was interrupted")]
    Interrupted,

    /// The driver failed to open a raw connection; `created_count` has
    /// already been rolled back by the time this is returned.
    #[error("driver failed to open a connection: {0}")]
    Driver(#[source] ResourceError),

    /// A pooled connection was found to be broken; it has been marked
    /// invalid and will be destroyed, not reused, at its next release.
    #[error("pooled connection is broken and will be destroyed")]
    ConnectionBroken,

    /// A facade-level misuse not tied to pool capacity or driver I/O, e.g.
    /// toggling auto-commit on a connection pinned to a transaction.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Errors raised by [`crate::transaction::Transaction`] and
/// [`crate::coordinator::TransactionCoordinator`].
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    /// `commit()` was called after the transaction's deadline passed; the
    /// transaction has already been rolled back by the time this returns.
    #[error("transaction timed out after {elapsed_ms}ms (limit {limit_ms}ms); rolled back")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    /// `commit()` was called on a transaction marked rollback-only; the
    /// transaction has already been rolled back by the time this returns.
    #[error("transaction was marked rollback-only; rolled back")]
    MarkedRollback,

    /// An operation was attempted in a status that does not support it,
    /// including "no transaction bound" via [`CoordinatorStatus::NoTransaction`].
    #[error("operation not valid in status {status:?}")]
    IllegalState { status: CoordinatorStatus },

    /// `begin()` was called while a transaction was already bound to the
    /// calling thread, or `resume()` while one was already bound.
    #[error("a transaction is already associated with this thread")]
    NotSupported,

    /// A resource's start/commit/rollback raised during enlistment or during
    /// the commit/rollback protocol.
    #[error("resource operation failed: {0}")]
    System(#[source] ResourceError),
}

impl TxError {
    pub(crate) fn system_msg(msg: impl Into<String>) -> Self {
        TxError::System(Box::new(Msg(msg.into())))
    }

    /// A coarse-grained classification, useful for matching without
    /// destructuring the boxed source carried by [`TxError::System`].
    #[must_use]
    pub fn kind(&self) -> TxErrorKind {
        match self {
            TxError::Timeout { .. } => TxErrorKind::Timeout,
            TxError::MarkedRollback => TxErrorKind::MarkedRollback,
            TxError::IllegalState { .. } => TxErrorKind::IllegalState,
            TxError::NotSupported => TxErrorKind::NotSupported,
            TxError::System(_) => TxErrorKind::System,
        }
    }
}

/// See [`TxError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxErrorKind {
    Timeout,
    MarkedRollback,
    IllegalState,
    NotSupported,
    System,
}

/// Unifies [`PoolError`] and [`TxError`] for call sites that can fail either
/// way, chiefly [`crate::DataSource::get_connection`] when it has to enlist a
/// freshly borrowed connection into the calling thread's transaction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Tx(#[from] TxError),
}
