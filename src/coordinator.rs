//! Thread-local transaction association: `begin`/`suspend`/`resume` and the
//! per-thread view of "which transaction, if any, is bound to me".

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TxError;
use crate::transaction::{CoordinatorStatus, Transaction};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

thread_local! {
    static CURRENT_TX: RefCell<Option<Arc<Transaction>>> = const { RefCell::new(None) };
    static TIMEOUT_OVERRIDE: RefCell<Option<Duration>> = const { RefCell::new(None) };
}

/// The process-wide transaction coordinator. Holds no state of its own —
/// association is per-thread, via `thread_local!` slots — so it is a
/// zero-sized singleton rather than something callers construct.
pub struct TransactionCoordinator(());

static GLOBAL: TransactionCoordinator = TransactionCoordinator(());

impl TransactionCoordinator {
    /// The process-wide coordinator instance.
    #[must_use]
    pub fn global() -> &'static TransactionCoordinator {
        &GLOBAL
    }

    /// Begins a new transaction and binds it to the calling thread. Fails
    /// with [`TxError::NotSupported`] if one is already bound — nested
    /// transactions are not supported.
    pub fn begin(&self) -> Result<Arc<Transaction>, TxError> {
        let already_bound = CURRENT_TX.with(|c| c.borrow().is_some());
        if already_bound {
            return Err(TxError::NotSupported);
        }
        let timeout = TIMEOUT_OVERRIDE.with(|t| *t.borrow()).unwrap_or(DEFAULT_TIMEOUT);
        let tx = Arc::new(Transaction::new(crate::branch::next_global_id(), timeout));
        CURRENT_TX.with(|c| *c.borrow_mut() = Some(Arc::clone(&tx)));
        tracing::debug!(global_id = tx.global_id(), timeout_ms = timeout.as_millis() as u64, "began transaction");
        Ok(tx)
    }

    /// The transaction bound to the calling thread, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<Arc<Transaction>> {
        CURRENT_TX.with(|c| c.borrow().clone())
    }

    /// The calling thread's view of transaction status: [`CoordinatorStatus::NoTransaction`]
    /// if nothing is bound.
    #[must_use]
    pub fn status(&self) -> CoordinatorStatus {
        match self.transaction() {
            Some(tx) => tx.status().into(),
            None => CoordinatorStatus::NoTransaction,
        }
    }

    /// Clears the calling thread's binding and returns it, without touching
    /// the transaction's own state. Returns `None` if nothing was bound.
    ///
    /// Unlike `commit`/`rollback`, this does not check whether the
    /// transaction's deadline has already passed — a suspended,
    /// already-timed-out transaction is handed back as-is, silently.
    pub fn suspend(&self) -> Option<Arc<Transaction>> {
        let tx = CURRENT_TX.with(|c| c.borrow_mut().take());
        if let Some(tx) = &tx {
            tracing::debug!(global_id = tx.global_id(), "suspended transaction");
        }
        tx
    }

    /// Binds a previously suspended transaction to the calling thread. Fails
    /// with [`TxError::NotSupported`] if one is already bound.
    ///
    /// A foreign `Transaction` implementation cannot be passed here by
    /// construction: `Transaction` is a concrete type only this crate can
    /// build, so the runtime `instanceof`-style rejection a JTA-style
    /// coordinator needs is a compile-time guarantee here instead.
    pub fn resume(&self, tx: Arc<Transaction>) -> Result<(), TxError> {
        let already_bound = CURRENT_TX.with(|c| c.borrow().is_some());
        if already_bound {
            return Err(TxError::NotSupported);
        }
        tracing::debug!(global_id = tx.global_id(), "resumed transaction");
        CURRENT_TX.with(|c| *c.borrow_mut() = Some(tx));
        Ok(())
    }

    pub fn set_rollback_only(&self) -> Result<(), TxError> {
        match self.transaction() {
            Some(tx) => tx.set_rollback_only(),
            None => Err(TxError::IllegalState {
                status: CoordinatorStatus::NoTransaction,
            }),
        }
    }

    pub fn commit(&self) -> Result<(), TxError> {
        let tx = CURRENT_TX.with(|c| c.borrow_mut().take());
        match tx {
            Some(tx) => tx.commit(),
            None => Err(TxError::IllegalState {
                status: CoordinatorStatus::NoTransaction,
            }),
        }
    }

    pub fn rollback(&self) -> Result<(), TxError> {
        let tx = CURRENT_TX.with(|c| c.borrow_mut().take());
        match tx {
            Some(tx) => tx.rollback(),
            None => Err(TxError::IllegalState {
                status: CoordinatorStatus::NoTransaction,
            }),
        }
    }

    /// Sets the timeout applied to the *next* `begin()` call on this thread.
    /// `0` clears the override back to the default. Negative values fail.
    pub fn set_transaction_timeout(&self, seconds: i64) -> Result<(), TxError> {
        if seconds < 0 {
            return Err(TxError::system_msg("transaction timeout must not be negative"));
        }
        TIMEOUT_OVERRIDE.with(|t| {
            *t.borrow_mut() = if seconds == 0 {
                None
            } else {
                Some(Duration::from_secs(seconds as u64))
            };
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_binds_and_commit_clears() {
        let c = TransactionCoordinator::global();
        let _ = c.rollback(); // clear any leftover binding from another test on this thread
        let tx = c.begin().unwrap();
        assert_eq!(tx.global_id(), c.transaction().unwrap().global_id());
        c.commit().unwrap();
        assert!(c.transaction().is_none());
    }

    #[test]
    fn nested_begin_rejected() {
        let c = TransactionCoordinator::global();
        let _ = c.rollback();
        let _tx = c.begin().unwrap();
        assert!(matches!(c.begin(), Err(TxError::NotSupported)));
        c.rollback().unwrap();
    }

    #[test]
    fn suspend_resume_round_trips() {
        let c = TransactionCoordinator::global();
        let _ = c.rollback();
        let tx = c.begin().unwrap();
        let id = tx.global_id();
        let suspended = c.suspend().unwrap();
        assert!(c.transaction().is_none());
        c.resume(suspended).unwrap();
        assert_eq!(c.transaction().unwrap().global_id(), id);
        c.rollback().unwrap();
    }
}
