//! The transaction state machine: enlisted resources, registered
//! synchronizations, and the commit/rollback protocol.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::branch::{BranchId, BranchStatus};
use crate::error::TxError;
use crate::resource::{EndFlag, StartFlag, Synchronization, XaResource};

/// The six states a [`Transaction`] moves through. Terminal states are
/// `Committed` and `RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    MarkedRollback,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
}

impl TransactionStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

/// [`TransactionStatus`] plus the "nothing bound to this thread" state a
/// [`crate::coordinator::TransactionCoordinator`] can observe that a bare
/// `Transaction` never can.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorStatus {
    NoTransaction,
    Active,
    MarkedRollback,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
}

impl From<TransactionStatus> for CoordinatorStatus {
    fn from(s: TransactionStatus) -> Self {
        match s {
            TransactionStatus::Active => Self::Active,
            TransactionStatus::MarkedRollback => Self::MarkedRollback,
            TransactionStatus::Committing => Self::Committing,
            TransactionStatus::Committed => Self::Committed,
            TransactionStatus::RollingBack => Self::RollingBack,
            TransactionStatus::RolledBack => Self::RolledBack,
        }
    }
}

struct EnlistedResource {
    resource: Box<dyn XaResource>,
    branch: BranchId,
    status: BranchStatus,
}

struct Inner {
    status: TransactionStatus,
    branch_counter: u32,
    resources: Vec<EnlistedResource>,
    synchronizations: Vec<Box<dyn Synchronization>>,
}

/// A single global transaction: the set of resources enlisted under it and
/// the commit/rollback protocol that drives them.
///
/// Mutated only by whichever thread currently holds the binding from
/// [`crate::coordinator::TransactionCoordinator`] — the internal mutex exists
/// so the type is `Send` for `suspend`/`resume` to hand it across threads,
/// not because concurrent access from multiple threads is supported.
pub struct Transaction {
    global_id: u64,
    start: Instant,
    timeout: Duration,
    inner: Mutex<Inner>,
}

impl Transaction {
    pub(crate) fn new(global_id: u64, timeout: Duration) -> Self {
        Self {
            global_id,
            start: Instant::now(),
            timeout,
            inner: Mutex::new(Inner {
                status: TransactionStatus::Active,
                branch_counter: 0,
                resources: Vec::new(),
                synchronizations: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn global_id(&self) -> u64 {
        self.global_id
    }

    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.inner.lock().unwrap().status
    }

    fn timed_out(&self) -> bool {
        self.start.elapsed() > self.timeout
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// Enlists a resource under a freshly allocated branch. Returns `Ok(false)`
    /// without allocating a branch if an equivalent resource (per
    /// [`XaResource::is_same_rm`]) is already enlisted.
    pub fn enlist(&self, mut resource: Box<dyn XaResource>) -> Result<bool, TxError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.status {
            TransactionStatus::Active => {}
            TransactionStatus::MarkedRollback => return Err(TxError::MarkedRollback),
            other => {
                return Err(TxError::IllegalState {
                    status: other.into(),
                });
            }
        }
        if self.timed_out() {
            return Err(TxError::Timeout {
                elapsed_ms: self.elapsed_ms(),
                limit_ms: self.timeout_ms(),
            });
        }
        if inner
            .resources
            .iter()
            .any(|r| r.resource.is_same_rm(resource.as_ref()))
        {
            return Ok(false);
        }
        inner.branch_counter += 1;
        let branch = BranchId::new(self.global_id, inner.branch_counter);
        resource
            .start(branch, StartFlag::NewBranch)
            .map_err(TxError::System)?;
        inner.resources.push(EnlistedResource {
            resource,
            branch,
            status: BranchStatus::Active,
        });
        Ok(true)
    }

    /// Removes the enlistment matching `resource` (by [`XaResource::is_same_rm`])
    /// and calls `end` on it with `flag`. Returns whether a mapping was removed.
    pub fn delist(&self, resource: &dyn XaResource, flag: EndFlag) -> Result<bool, TxError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.status {
            TransactionStatus::Active | TransactionStatus::MarkedRollback => {}
            other => {
                return Err(TxError::IllegalState {
                    status: other.into(),
                });
            }
        }
        let Some(pos) = inner
            .resources
            .iter()
            .position(|r| r.resource.is_same_rm(resource))
        else {
            return Ok(false);
        };
        let mut removed = inner.resources.remove(pos);
        removed.resource.end(removed.branch, flag).map_err(TxError::System)?;
        Ok(true)
    }

    pub fn register_synchronization(&self, sync: Box<dyn Synchronization>) -> Result<(), TxError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.status == TransactionStatus::MarkedRollback {
            return Err(TxError::MarkedRollback);
        }
        if inner.status.is_terminal() {
            return Err(TxError::IllegalState {
                status: inner.status.into(),
            });
        }
        inner.synchronizations.push(sync);
        Ok(())
    }

    pub fn set_rollback_only(&self) -> Result<(), TxError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.status {
            TransactionStatus::Active => {
                inner.status = TransactionStatus::MarkedRollback;
                Ok(())
            }
            TransactionStatus::MarkedRollback => Ok(()),
            other => Err(TxError::IllegalState {
                status: other.into(),
            }),
        }
    }

    /// Commits if `Active` and not timed out; otherwise rolls back and
    /// reports why commit could not proceed.
    pub fn commit(&self) -> Result<(), TxError> {
        let status = self.inner.lock().unwrap().status;
        match status {
            TransactionStatus::Active if !self.timed_out() => self.do_commit(),
            TransactionStatus::Active => {
                let elapsed_ms = self.elapsed_ms();
                let limit_ms = self.timeout_ms();
                let _ = self.do_rollback();
                Err(TxError::Timeout {
                    elapsed_ms,
                    limit_ms,
                })
            }
            TransactionStatus::MarkedRollback => {
                let _ = self.do_rollback();
                Err(TxError::MarkedRollback)
            }
            other => Err(TxError::IllegalState {
                status: other.into(),
            }),
        }
    }

    pub fn rollback(&self) -> Result<(), TxError> {
        let status = self.inner.lock().unwrap().status;
        if status == TransactionStatus::Committed {
            return Err(TxError::IllegalState {
                status: status.into(),
            });
        }
        self.do_rollback()
    }

    fn fire_before_completion(&self) {
        let mut inner = self.inner.lock().unwrap();
        for sync in &mut inner.synchronizations {
            sync.before_completion();
        }
    }

    fn fire_after_completion(&self, status: TransactionStatus) {
        let mut inner = self.inner.lock().unwrap();
        for sync in &mut inner.synchronizations {
            sync.after_completion(status);
        }
    }

    fn do_commit(&self) -> Result<(), TxError> {
        self.fire_before_completion();
        self.inner.lock().unwrap().status = TransactionStatus::Committing;

        let mut first_err = None;
        {
            let mut inner = self.inner.lock().unwrap();
            for entry in &mut inner.resources {
                if entry.status != BranchStatus::Active {
                    continue;
                }
                match entry.resource.commit(entry.branch, true) {
                    Ok(()) => {
                        if let Err(e) = entry.resource.end(entry.branch, EndFlag::Success) {
                            tracing::error!(branch = %entry.branch, error = %e, "resource end(SUCCESS) failed after commit");
                            first_err.get_or_insert(e);
                        }
                        entry.status = BranchStatus::Committed;
                    }
                    Err(e) => {
                        tracing::error!(branch = %entry.branch, error = %e, "resource commit failed");
                        first_err.get_or_insert(e);
                    }
                }
            }
        }

        match first_err {
            None => {
                self.inner.lock().unwrap().status = TransactionStatus::Committed;
                self.fire_after_completion(TransactionStatus::Committed);
                Ok(())
            }
            Some(e) => {
                let _ = self.do_rollback();
                Err(TxError::System(e))
            }
        }
    }

    fn do_rollback(&self) -> Result<(), TxError> {
        if self.inner.lock().unwrap().status == TransactionStatus::RolledBack {
            return Ok(());
        }
        self.inner.lock().unwrap().status = TransactionStatus::RollingBack;

        let mut first_err = None;
        {
            let mut inner = self.inner.lock().unwrap();
            for entry in &mut inner.resources {
                if entry.status != BranchStatus::Active {
                    continue;
                }
                if let Err(e) = entry.resource.rollback(entry.branch) {
                    tracing::error!(branch = %entry.branch, error = %e, "resource rollback failed");
                    first_err.get_or_insert(e);
                }
                if let Err(e) = entry.resource.end(entry.branch, EndFlag::Fail) {
                    tracing::error!(branch = %entry.branch, error = %e, "resource end(FAIL) failed after rollback");
                    first_err.get_or_insert(e);
                }
                entry.status = BranchStatus::RolledBack;
            }
        }

        self.inner.lock().unwrap().status = TransactionStatus::RolledBack;
        self.fire_after_completion(TransactionStatus::RolledBack);
        match first_err {
            None => Ok(()),
            Some(e) => Err(TxError::System(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceError;

    struct FakeResource {
        key: u64,
        fail_commit: bool,
        log: std::sync::Arc<Mutex<Vec<&'static str>>>,
    }

    impl XaResource for FakeResource {
        fn resource_key(&self) -> u64 {
            self.key
        }
        fn start(&mut self, _b: BranchId, _f: StartFlag) -> Result<(), ResourceError> {
            self.log.lock().unwrap().push("start");
            Ok(())
        }
        fn end(&mut self, _b: BranchId, _f: EndFlag) -> Result<(), ResourceError> {
            self.log.lock().unwrap().push("end");
            Ok(())
        }
        fn commit(&mut self, _b: BranchId, _one_phase: bool) -> Result<(), ResourceError> {
            if self.fail_commit {
                return Err(Box::new(crate::error::PoolError::ConnectionBroken));
            }
            self.log.lock().unwrap().push("commit");
            Ok(())
        }
        fn rollback(&mut self, _b: BranchId) -> Result<(), ResourceError> {
            self.log.lock().unwrap().push("rollback");
            Ok(())
        }
        fn prepare(&mut self, _b: BranchId) -> Result<crate::resource::Vote, ResourceError> {
            Ok(crate::resource::Vote::ReadOnly)
        }
    }

    #[test]
    fn commit_happy_path() {
        let tx = Transaction::new(1, Duration::from_secs(10));
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        let r = Box::new(FakeResource {
            key: 1,
            fail_commit: false,
            log: log.clone(),
        });
        assert!(tx.enlist(r).unwrap());
        tx.commit().unwrap();
        assert_eq!(tx.status(), TransactionStatus::Committed);
        assert_eq!(&*log.lock().unwrap(), &["start", "commit", "end"]);
    }

    #[test]
    fn second_enlist_of_same_resource_is_noop() {
        let tx = Transaction::new(1, Duration::from_secs(10));
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        let r1 = Box::new(FakeResource {
            key: 42,
            fail_commit: false,
            log: log.clone(),
        });
        let r2 = Box::new(FakeResource {
            key: 42,
            fail_commit: false,
            log: log.clone(),
        });
        assert!(tx.enlist(r1).unwrap());
        assert!(!tx.enlist(r2).unwrap());
    }

    #[test]
    fn marked_rollback_fails_commit_and_rolls_back() {
        let tx = Transaction::new(1, Duration::from_secs(10));
        tx.set_rollback_only().unwrap();
        let err = tx.commit().unwrap_err();
        assert_eq!(err.kind(), crate::error::TxErrorKind::MarkedRollback);
        assert_eq!(tx.status(), TransactionStatus::RolledBack);
    }

    #[test]
    fn commit_failure_rolls_back_remaining_resources() {
        let tx = Transaction::new(1, Duration::from_secs(10));
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        let ok_resource = Box::new(FakeResource {
            key: 1,
            fail_commit: false,
            log: log.clone(),
        });
        let failing = Box::new(FakeResource {
            key: 2,
            fail_commit: true,
            log: log.clone(),
        });
        tx.enlist(ok_resource).unwrap();
        tx.enlist(failing).unwrap();
        let err = tx.commit().unwrap_err();
        assert_eq!(err.kind(), crate::error::TxErrorKind::System);
        assert_eq!(tx.status(), TransactionStatus::RolledBack);
    }

    #[test]
    fn branch_numbers_are_distinct_and_increasing() {
        let tx = Transaction::new(1, Duration::from_secs(10));
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        let branches: Vec<_> = (1..=3)
            .map(|key| {
                let before = tx.inner.lock().unwrap().branch_counter;
                tx.enlist(Box::new(FakeResource {
                    key,
                    fail_commit: false,
                    log: log.clone(),
                }))
                .unwrap();
                let after = tx.inner.lock().unwrap().branch_counter;
                assert!(after > before);
                after
            })
            .collect();
        let mut sorted = branches.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted, branches, "branch numbers must be distinct and strictly increasing");
    }

    #[test]
    fn commit_after_terminal_is_illegal_state() {
        let tx = Transaction::new(1, Duration::from_secs(10));
        tx.commit().unwrap();
        let err = tx.commit().unwrap_err();
        assert_eq!(err.kind(), crate::error::TxErrorKind::IllegalState);
    }
}
