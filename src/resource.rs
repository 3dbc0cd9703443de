//! The two-phase-commit-style contract a [`crate::adapter::ResourceAdapter`]
//! implements against a [`crate::transaction::Transaction`].

use crate::branch::BranchId;
use crate::error::ResourceError;
use crate::transaction::TransactionStatus;

/// Flag passed to `start`, mirroring the XA `TMNOFLAGS`/`TMRESUME`/`TMJOIN`
/// distinction, narrowed to what this coordinator actually needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFlag {
    NewBranch,
    Resume,
}

/// Flag passed to `end`, mirroring XA `TMSUCCESS`/`TMFAIL`/`TMSUSPEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndFlag {
    Success,
    Fail,
    Suspend,
}

/// A resource's prepare vote. One-phase commit never calls `prepare`; it is
/// retained for resources that might one day need a real two-phase path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    ReadOnly,
    Prepared,
}

/// A resource enlisted in a [`crate::transaction::Transaction`].
///
/// Implementors must be able to report a stable `resource_key` that two
/// different `XaResource` values share exactly when they represent the same
/// underlying connection; this is the identity check JTA calls `isSameRM`,
/// done here without the `Any` downcast a trait-object-based rewrite would
/// otherwise need.
pub trait XaResource: Send {
    fn resource_key(&self) -> u64;

    fn start(&mut self, branch: BranchId, flag: StartFlag) -> Result<(), ResourceError>;
    fn end(&mut self, branch: BranchId, flag: EndFlag) -> Result<(), ResourceError>;
    fn commit(&mut self, branch: BranchId, one_phase: bool) -> Result<(), ResourceError>;
    fn rollback(&mut self, branch: BranchId) -> Result<(), ResourceError>;
    fn prepare(&mut self, branch: BranchId) -> Result<Vote, ResourceError>;

    fn forget(&mut self, _branch: BranchId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn is_same_rm(&self, other: &dyn XaResource) -> bool {
        self.resource_key() == other.resource_key()
    }
}

/// A callback registered on a [`crate::transaction::Transaction`] to observe
/// its completion, JTA-`Synchronization`-style.
pub trait Synchronization: Send {
    fn before_completion(&mut self) {}
    fn after_completion(&mut self, _status: TransactionStatus) {}
}
