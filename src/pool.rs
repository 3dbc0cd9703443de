//! The bounded connection pool: borrow/release, idle eviction, graceful
//! shutdown, and the transaction-affinity table `DataSource` pins connections
//! into.
//!
//! Guarded by one `std::sync::Mutex` plus one `std::sync::Condvar`, per the
//! concurrency model: preemptive OS threads blocking on a condition
//! variable, never an async runtime. All raw I/O — `Driver::connect`,
//! `Driver::close`, `Driver::set_lock_timeout` — happens strictly outside the
//! mutex guard: decide under lock, drop the guard, then act.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::connection::PooledConnection;
use crate::driver::{ConnectionProperties, Driver};
use crate::error::PoolError;

/// Typed pool configuration. Built via [`PoolConfigBuilder`] or
/// [`crate::config::pool_config_from_map`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub pool_size: u32,
    pub borrow_timeout: Duration,
    pub keep_alive: Duration,
    pub lock_timeout: i64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            borrow_timeout: Duration::from_secs(3),
            keep_alive: Duration::from_secs(1800),
            lock_timeout: -1,
        }
    }
}

/// Fluent builder for [`PoolConfig`]: `new() -> with_x() -> finish()`.
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    cfg: PoolConfig,
}

impl PoolConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cfg: PoolConfig::default(),
        }
    }

    #[must_use]
    pub fn pool_size(mut self, n: u32) -> Self {
        self.cfg.pool_size = n;
        self
    }

    #[must_use]
    pub fn borrow_timeout(mut self, d: Duration) -> Self {
        self.cfg.borrow_timeout = d;
        self
    }

    #[must_use]
    pub fn keep_alive(mut self, d: Duration) -> Self {
        self.cfg.keep_alive = d;
        self
    }

    #[must_use]
    pub fn lock_timeout(mut self, ms: i64) -> Self {
        self.cfg.lock_timeout = ms;
        self
    }

    pub fn finish(self) -> Result<PoolConfig, PoolError> {
        if self.cfg.pool_size == 0 {
            return Err(PoolError::Config("pool-size must be at least 1".into()));
        }
        if self.cfg.borrow_timeout.is_zero() {
            return Err(PoolError::Config("borrow-timeout must be greater than zero".into()));
        }
        if self.cfg.keep_alive.is_zero() {
            return Err(PoolError::Config("keep-alive must be greater than zero".into()));
        }
        Ok(self.cfg)
    }
}

struct PoolState<D: Driver> {
    idle: VecDeque<PooledConnection<D>>,
    created_count: u32,
    waiting: u32,
    check_idle_at: Instant,
    closed: bool,
    interrupt_epoch: u64,
}

/// The pool's shared, `Arc`-held state. `ConnectionPool` is a thin handle
/// around this; `PooledConnection` and `ResourceAdapter` hold a `Weak` back
/// to it so a connection can return itself without keeping the pool alive
/// past an explicit `shutdown`.
pub(crate) struct PoolShared<D: Driver> {
    pub(crate) driver: D,
    props: ConnectionProperties,
    config: PoolConfig,
    state: Mutex<PoolState<D>>,
    cond: Condvar,
    in_transaction: Mutex<HashMap<u64, Arc<Mutex<PooledConnection<D>>>>>,
    next_conn_id: AtomicU64,
    self_weak: Weak<PoolShared<D>>,
}

impl<D: Driver> PoolShared<D> {
    pub(crate) fn return_or_destroy(&self, id: u64, raw: D::Raw, invalidate: bool) {
        if invalidate {
            let mut state = self.state.lock().unwrap();
            state.created_count -= 1;
            self.cond.notify_one();
            drop(state);
            tracing::debug!(conn_id = id, "destroying invalidated connection");
            self.driver.close(raw);
            return;
        }
        let mut state = self.state.lock().unwrap();
        if state.closed {
            state.created_count -= 1;
            drop(state);
            tracing::debug!(conn_id = id, "pool closed; destroying returned connection");
            self.driver.close(raw);
            return;
        }
        let conn = PooledConnection::new(id, raw, self.self_weak.clone());
        state.idle.push_front(conn);
        self.cond.notify_one();
        tracing::debug!(conn_id = id, "released connection to idle set");
    }

    pub(crate) fn insert_pinned(&self, tx_id: u64, conn: Arc<Mutex<PooledConnection<D>>>) {
        self.in_transaction.lock().unwrap().insert(tx_id, conn);
    }

    pub(crate) fn get_pinned(&self, tx_id: u64) -> Option<Arc<Mutex<PooledConnection<D>>>> {
        self.in_transaction.lock().unwrap().get(&tx_id).cloned()
    }

    pub(crate) fn remove_pinned(&self, tx_id: u64) {
        self.in_transaction.lock().unwrap().remove(&tx_id);
    }

    pub(crate) fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn props(&self) -> &ConnectionProperties {
        &self.props
    }
}

/// A bounded pool of connections of type `D::Raw`, opened and closed through
/// a single [`Driver`].
pub struct ConnectionPool<D: Driver> {
    pub(crate) shared: Arc<PoolShared<D>>,
}

impl<D: Driver> Clone for ConnectionPool<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: Driver> ConnectionPool<D> {
    pub fn new(driver: D, props: ConnectionProperties, config: PoolConfig) -> Self {
        let shared = Arc::new_cyclic(|self_weak| PoolShared {
            driver,
            props,
            config: config.clone(),
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                created_count: 0,
                waiting: 0,
                check_idle_at: Instant::now() + sweep_interval(&config),
                closed: false,
                interrupt_epoch: 0,
            }),
            cond: Condvar::new(),
            in_transaction: Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            self_weak: self_weak.clone(),
        });
        Self { shared }
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Borrows a connection, creating one if under capacity, waiting up to
    /// `borrow-timeout` if not, and sweeping idle connections past
    /// `keep-alive` along the way. Does not consider transaction affinity —
    /// see [`crate::datasource::DataSource::get_connection`] for that layer.
    pub fn get_connection(&self) -> Result<PooledConnection<D>, PoolError> {
        let start = Instant::now();
        let deadline = start + self.shared.config.borrow_timeout;
        loop {
            let mut expired = Vec::new();
            let outcome = {
                let mut state = self.shared.state.lock().unwrap();
                let now = Instant::now();
                if now >= state.check_idle_at {
                    state.check_idle_at = now + sweep_interval(&self.shared.config);
                    expired = sweep_idle(&mut state, self.shared.config.keep_alive, now);
                }
                if state.closed {
                    Outcome::Err(PoolError::Closed)
                } else if let Some(mut conn) = state.idle.pop_front() {
                    conn.touch(now);
                    Outcome::Ready(conn)
                } else if state.created_count < self.shared.config.pool_size {
                    state.created_count += 1;
                    Outcome::Create
                } else if now >= deadline {
                    Outcome::Err(PoolError::BorrowTimeout {
                        waited_ms: now.duration_since(start).as_millis() as u64,
                        limit_ms: self.shared.config.borrow_timeout.as_millis() as u64,
                    })
                } else {
                    state.waiting += 1;
                    let epoch = state.interrupt_epoch;
                    let (mut guard, _timeout_result) =
                        self.shared.cond.wait_timeout(state, deadline - now).unwrap();
                    guard.waiting -= 1;
                    if guard.interrupt_epoch != epoch {
                        Outcome::Err(PoolError::Interrupted)
                    } else {
                        Outcome::Retry
                    }
                }
            };

            for conn in expired {
                if let Some(raw) = conn_into_raw(conn) {
                    self.shared.driver.close(raw);
                }
            }

            match outcome {
                Outcome::Ready(conn) => {
                    let broken = conn.raw.as_ref().is_some_and(|raw| self.shared.driver.is_broken(raw));
                    if !broken {
                        return Ok(conn);
                    }
                    tracing::warn!(conn_id = conn.id(), "idle connection failed liveness check; destroying");
                    if let Some(raw) = conn_into_raw(conn) {
                        self.shared.driver.close(raw);
                    }
                    let mut state = self.shared.state.lock().unwrap();
                    state.created_count -= 1;
                    self.shared.cond.notify_one();
                    continue;
                }
                Outcome::Err(e) => return Err(e),
                Outcome::Retry => continue,
                Outcome::Create => {
                    match self.shared.driver.connect(&self.shared.props) {
                        Ok(mut raw) => {
                            if self.shared.config.lock_timeout >= 0 {
                                if let Err(e) = self
                                    .shared
                                    .driver
                                    .set_lock_timeout(&mut raw, self.shared.config.lock_timeout)
                                {
                                    tracing::warn!(error = %e, "SET LOCK_TIMEOUT failed; continuing with driver default");
                                }
                            }
                            let id = self.shared.next_conn_id();
                            tracing::debug!(conn_id = id, "opened new connection");
                            return Ok(PooledConnection::new(id, raw, Arc::downgrade(&self.shared)));
                        }
                        Err(e) => {
                            let mut state = self.shared.state.lock().unwrap();
                            state.created_count -= 1;
                            self.shared.cond.notify_one();
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Returns a connection to the idle set, or destroys it if it was marked
    /// invalid or the pool has since been shut down. Prefer letting the
    /// handle drop; this exists for callers that already own a
    /// [`PooledConnection`] by value and want to be explicit.
    pub fn release(&self, conn: PooledConnection<D>) {
        drop(conn);
    }

    /// Closes the pool: idle connections are destroyed immediately, waiting
    /// borrowers are woken (and will observe `PoolError::Closed`), and any
    /// connection currently on loan is destroyed as it is returned rather
    /// than pooled.
    pub fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut state = self.shared.state.lock().unwrap();
            state.closed = true;
            let drained = state.idle.drain(..).collect::<Vec<_>>();
            state.created_count -= drained.len() as u32;
            self.shared.cond.notify_all();
            drained
        };
        for conn in drained {
            if let Some(raw) = conn_into_raw(conn) {
                self.shared.driver.close(raw);
            }
        }
        tracing::debug!("pool shut down");
    }

    /// Testing hook: wakes every borrower currently blocked in
    /// [`ConnectionPool::get_connection`] and makes them observe
    /// `PoolError::Interrupted` instead of retrying. A best-effort analogue
    /// of thread-interrupt semantics, not a faithful signal-driven port.
    pub fn interrupt_waiters(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.interrupt_epoch += 1;
        self.shared.cond.notify_all();
    }

    #[must_use]
    pub fn open_count(&self) -> u32 {
        self.shared.state.lock().unwrap().created_count
    }

    #[must_use]
    pub fn idle_count(&self) -> u32 {
        self.shared.state.lock().unwrap().idle.len() as u32
    }

    #[must_use]
    pub fn active_transaction_count(&self) -> u32 {
        self.shared.in_transaction.lock().unwrap().len() as u32
    }
}

enum Outcome<D: Driver> {
    Ready(PooledConnection<D>),
    Create,
    Retry,
    Err(PoolError),
}

fn sweep_interval(config: &PoolConfig) -> Duration {
    (config.keep_alive / 10).max(Duration::from_millis(100))
}

/// Partitions expired connections out of `state.idle`, decrementing
/// `created_count` for each. Must run with `state` locked; the returned
/// connections are closed by the caller *after* the lock is dropped.
fn sweep_idle<D: Driver>(state: &mut PoolState<D>, keep_alive: Duration, now: Instant) -> Vec<PooledConnection<D>> {
    let mut kept = VecDeque::with_capacity(state.idle.len());
    let mut expired = Vec::new();
    for conn in state.idle.drain(..) {
        if now.duration_since(conn.last_access()) >= keep_alive {
            expired.push(conn);
        } else {
            kept.push_back(conn);
        }
    }
    state.idle = kept;
    state.created_count -= expired.len() as u32;
    if !expired.is_empty() {
        tracing::warn!(count = expired.len(), "idle sweep destroying expired connections");
    }
    expired
}

/// Strips the raw handle out of a `PooledConnection` so it can be closed
/// without running the connection's own `Drop` (which would otherwise try to
/// release it straight back into the pool we just swept it out of).
fn conn_into_raw<D: Driver>(mut conn: PooledConnection<D>) -> Option<D::Raw> {
    conn.raw.take()
}
