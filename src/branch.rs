//! Branch identifiers: one per resource enlisted in a transaction.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GLOBAL_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates the next global transaction id. `0` is never handed out; it is
/// reserved as a "no transaction" sentinel for debug display.
pub(crate) fn next_global_id() -> u64 {
    NEXT_GLOBAL_ID.fetch_add(1, Ordering::Relaxed)
}

/// Format tag stamped at the front of a serialized [`BranchId`].
pub const FORMAT_TAG: u32 = 0x4F64_6B6C;

/// Identifies one resource's branch of a global transaction: the pair of a
/// global transaction id and a per-transaction branch sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchId {
    global_id: u64,
    branch_no: u32,
}

impl BranchId {
    pub(crate) fn new(global_id: u64, branch_no: u32) -> Self {
        Self {
            global_id,
            branch_no,
        }
    }

    #[must_use]
    pub fn global_id(&self) -> u64 {
        self.global_id
    }

    #[must_use]
    pub fn branch_no(&self) -> u32 {
        self.branch_no
    }

    /// Serializes as format-tag(4, BE) + global-id(8, BE) + branch-no(4, BE).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[0..4].copy_from_slice(&FORMAT_TAG.to_be_bytes());
        buf[4..12].copy_from_slice(&self.global_id.to_be_bytes());
        buf[12..16].copy_from_slice(&self.branch_no.to_be_bytes());
        buf
    }

    /// Parses bytes produced by [`BranchId::to_bytes`].
    pub fn from_bytes(bytes: &[u8; 16]) -> Result<Self, crate::error::PoolError> {
        let tag = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        if tag != FORMAT_TAG {
            return Err(crate::error::PoolError::Config(format!(
                "bad branch id format tag 0x{tag:08X}"
            )));
        }
        let global_id = u64::from_be_bytes(bytes[4..12].try_into().unwrap());
        let branch_no = u32::from_be_bytes(bytes[12..16].try_into().unwrap());
        Ok(Self::new(global_id, branch_no))
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.global_id, self.branch_no)
    }
}

/// Per-resource commit/rollback state, tracked inside [`crate::transaction::Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchStatus {
    Active,
    Committed,
    RolledBack,
}
