#![forbid(unsafe_code)]

//! A bounded database-connection pool coupled with a thread-local,
//! XA-style transaction coordinator.
//!
//! [`DataSource`] hands out pooled connections; when a transaction is bound
//! to the calling thread via [`TransactionCoordinator`], repeated calls to
//! [`DataSource::get_connection`] return the same connection, enlisted once
//! and released back to the pool when that transaction completes.

pub mod adapter;
pub mod branch;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod datasource;
pub mod driver;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod resource;
pub mod transaction;

pub use adapter::ResourceAdapter;
pub use branch::{BranchId, BranchStatus};
pub use config::pool_config_from_map;
pub use connection::PooledConnection;
pub use coordinator::TransactionCoordinator;
pub use datasource::{Connection, DataSource, PoolStats};
pub use driver::{ConnectionProperties, Driver};
pub use error::{Error, PoolError, TxError, TxErrorKind};
pub use pool::{ConnectionPool, PoolConfig, PoolConfigBuilder};
pub use resource::{EndFlag, StartFlag, Synchronization, Vote, XaResource};
pub use transaction::{CoordinatorStatus, Transaction, TransactionStatus};

#[cfg(feature = "sqlite")]
pub use driver::SqliteDriver;
