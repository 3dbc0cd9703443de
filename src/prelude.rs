//! Convenient imports for common functionality.
//!
//! This module re-exports the types most call sites need to get started:
//! open a [`DataSource`], begin a transaction via [`TransactionCoordinator`],
//! and borrow connections through it.

pub use crate::coordinator::TransactionCoordinator;
pub use crate::datasource::{Connection, DataSource, PoolStats};
pub use crate::driver::{ConnectionProperties, Driver};
pub use crate::error::{Error, PoolError, TxError, TxErrorKind};
pub use crate::pool::{ConnectionPool, PoolConfig, PoolConfigBuilder};
pub use crate::transaction::{CoordinatorStatus, Transaction, TransactionStatus};

#[cfg(feature = "sqlite")]
pub use crate::driver::SqliteDriver;
