//! # Connection Pool
//!
//! Purpose: Bound and recycle connections per backend address so callers
//! share a few long-lived sockets instead of dialing per command.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: The mutex guards only the free lists and live
//!    counts. Dials, liveness checks and closes run outside of it, and the
//!    blocking wait releases it through the condvar.
//! 3. **Connections Are the Unit of Exclusion**: A lent-out connection is
//!    owned by one `PooledConnection`, so one command is in flight per socket.
//! 4. **Return Exactly Once**: The RAII guard hands its connection back on
//!    `release` or on drop, never twice.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::config::ClientConfig;
use crate::connection::{Connection, Connector, TcpConnector};
use crate::error::{ClientError, ClientResult};
use crate::metrics::{PoolMetrics, PoolStats};

#[derive(Default)]
struct AddrSlot {
    idle: VecDeque<Connection>,
    live: usize,
}

struct PoolState {
    closed: bool,
    slots: HashMap<String, AddrSlot>,
}

struct PoolInner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<PoolState>,
    // One condvar per address, all paired with `state`. Signalled whenever a
    // connection or a live slot for that address frees up.
    available: HashMap<String, Condvar>,
    metrics: PoolMetrics,
}

/// What `acquire` decided to do while holding the lock.
enum Step {
    Reuse(Connection),
    Dial,
}

/// Connection pool handle. Cloning shares the same pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Creates a pool dialing plain TCP.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::with_connector(config, Arc::new(TcpConnector))
    }

    /// Creates a pool dialing through `connector`.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> ClientResult<Self> {
        config.validate()?;
        let slots = config
            .addresses
            .iter()
            .map(|addr| (addr.clone(), AddrSlot::default()))
            .collect();
        let available = config
            .addresses
            .iter()
            .map(|addr| (addr.clone(), Condvar::new()))
            .collect();
        Ok(Pool {
            inner: Arc::new(PoolInner {
                config,
                connector,
                state: Mutex::new(PoolState { closed: false, slots }),
                available,
                metrics: PoolMetrics::default(),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Lends a `Ready` connection to `addr`.
    ///
    /// **Logic**:
    /// 1. Pop an idle connection; ping it first if it sat longer than
    ///    `stale_after`, discarding it on failure.
    /// 2. Otherwise dial a new one if `addr` is below `max_connections`.
    /// 3. Otherwise wait up to `wait_timeout` for a release.
    pub fn acquire(&self, addr: &str) -> ClientResult<PooledConnection> {
        let config = &self.inner.config;
        let deadline = Instant::now() + config.wait_timeout;
        let available = self
            .inner
            .available
            .get(addr)
            .ok_or_else(|| ClientError::UnknownAddress(addr.to_string()))?;
        let mut waited = false;

        loop {
            let step = {
                let mut state = self.inner.state.lock();
                loop {
                    if state.closed {
                        return Err(ClientError::PoolClosed);
                    }
                    let slot = state
                        .slots
                        .get_mut(addr)
                        .ok_or_else(|| ClientError::UnknownAddress(addr.to_string()))?;
                    if let Some(conn) = slot.idle.pop_front() {
                        break Step::Reuse(conn);
                    }
                    if slot.live < config.max_connections {
                        slot.live += 1;
                        break Step::Dial;
                    }

                    if !waited {
                        waited = true;
                        self.inner.metrics.record_wait();
                    }
                    let timed_out = available.wait_until(&mut state, deadline).timed_out();
                    if timed_out && Instant::now() >= deadline {
                        self.inner.metrics.record_timeout();
                        return Err(ClientError::PoolExhausted {
                            addr: addr.to_string(),
                        });
                    }
                }
            };

            match step {
                Step::Reuse(mut conn) => {
                    if conn.idle_for() >= config.stale_after
                        && !conn.check_alive(config.liveness_timeout)
                    {
                        self.discard(conn);
                        continue;
                    }
                    self.inner.metrics.record_acquisition(true);
                    debug!(addr = %addr, conn_id = conn.id(), "reusing pooled connection");
                    return Ok(PooledConnection::new(self.clone(), conn));
                }
                Step::Dial => {
                    self.inner.metrics.record_dial();
                    let opened = Connection::open(
                        self.inner.connector.as_ref(),
                        addr,
                        config.dial_timeout,
                        config.io_timeout,
                    );
                    return match opened {
                        Ok(conn) => {
                            self.inner.metrics.record_acquisition(false);
                            Ok(PooledConnection::new(self.clone(), conn))
                        }
                        Err(err) => {
                            self.release_slot(addr);
                            Err(err)
                        }
                    };
                }
            }
        }
    }

    /// Returns a connection to the pool.
    ///
    /// Healthy `Ready` connections go back on the free list (up to
    /// `max_idle`); everything else is closed and frees its live slot.
    pub(crate) fn release(&self, conn: Connection, healthy: bool) {
        let returned = {
            let mut state = self.inner.state.lock();
            let closed = state.closed;
            match state.slots.get_mut(conn.addr()) {
                Some(slot)
                    if healthy
                        && conn.is_ready()
                        && !closed
                        && slot.idle.len() < self.inner.config.max_idle =>
                {
                    debug!(addr = %conn.addr(), conn_id = conn.id(), "connection returned");
                    let addr = conn.addr().to_string();
                    slot.idle.push_back(conn);
                    Ok(addr)
                }
                _ => Err(conn),
            }
        };

        match returned {
            Ok(addr) => self.notify(&addr),
            Err(conn) => self.discard(conn),
        }
    }

    /// Closes every idle connection and fails future acquisitions.
    ///
    /// Connections lent out at this point are closed when they come back.
    /// Until then the caller holding the guard keeps a working socket and may
    /// finish its command on it.
    pub fn close(&self) {
        let drained: Vec<Connection> = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            let mut drained = Vec::new();
            for slot in state.slots.values_mut() {
                slot.live -= slot.idle.len();
                drained.extend(slot.idle.drain(..));
            }
            drained
        };
        for available in self.inner.available.values() {
            available.notify_all();
        }

        for mut conn in drained {
            conn.close();
            self.inner.metrics.record_discard();
        }
        debug!("connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Live connections (idle + lent out) for `addr`.
    pub fn live_count(&self, addr: &str) -> usize {
        let state = self.inner.state.lock();
        state.slots.get(addr).map_or(0, |slot| slot.live)
    }

    /// Idle connections waiting in the free list for `addr`.
    pub fn idle_count(&self, addr: &str) -> usize {
        let state = self.inner.state.lock();
        state.slots.get(addr).map_or(0, |slot| slot.idle.len())
    }

    pub fn stats(&self) -> PoolStats {
        let (live, idle) = {
            let state = self.inner.state.lock();
            state.slots.values().fold((0, 0), |(live, idle), slot| {
                (live + slot.live as u64, idle + slot.idle.len() as u64)
            })
        };
        self.inner.metrics.snapshot(live, idle)
    }

    fn discard(&self, mut conn: Connection) {
        conn.close();
        self.inner.metrics.record_discard();
        debug!(addr = %conn.addr(), conn_id = conn.id(), "connection discarded");
        self.release_slot(conn.addr());
    }

    fn release_slot(&self, addr: &str) {
        {
            let mut state = self.inner.state.lock();
            if let Some(slot) = state.slots.get_mut(addr) {
                slot.live = slot.live.saturating_sub(1);
            }
        }
        self.notify(addr);
    }

    fn notify(&self, addr: &str) {
        if let Some(available) = self.inner.available.get(addr) {
            available.notify_one();
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("addresses", &self.inner.config.addresses)
            .field("stats", &self.stats())
            .finish()
    }
}

/// RAII guard returning a connection to the pool.
///
/// Dropping the guard without [`release`](PooledConnection::release) returns
/// the connection only if it is `Ready`; a connection abandoned mid-command
/// is discarded instead of handed to the next caller.
pub struct PooledConnection {
    pool: Pool,
    conn: Option<Connection>,
}

impl PooledConnection {
    fn new(pool: Pool, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
        }
    }

    /// Hands the connection back, discarding it when `healthy` is false.
    pub fn release(mut self, healthy: bool) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, healthy);
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.conn {
            Some(conn) => fmt::Debug::fmt(conn, f),
            None => f.write_str("PooledConnection(released)"),
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection exists until release")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection exists until release")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let healthy = conn.is_ready();
            self.pool.release(conn, healthy);
        }
    }
}
