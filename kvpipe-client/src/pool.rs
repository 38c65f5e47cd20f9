//! # Connection Pool
//!
//! Purpose: Reuse connections to one host to avoid repeated handshakes, bound
//! how many can be open at once, and allow the whole pool to be retired when
//! the host link goes bad.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Lazy Dial**: Building a pool never touches the network.
//! 3. **Minimal Locking**: Hold the mutex only while moving idle connections;
//!    dialing and closing happen outside it.
//! 4. **Replace, Don't Mutate**: A closed pool stays closed; supervisors
//!    install a new pool instead of reopening an old one.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use kvpipe_common::{HostConfig, KvError, KvResult};

use crate::clock::Clock;
use crate::connection::{Dialer, RawConnection};
use crate::resp::RespValue;

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections parked in the pool.
    pub idle: usize,
    /// Connections counted against the limit (idle + borrowed + dialing).
    pub open: usize,
    pub max_idle: usize,
    /// 0 means unbounded.
    pub max_active: usize,
    pub closed: bool,
}

struct IdleConnection {
    conn: Box<dyn RawConnection>,
    idle_since: Instant,
}

struct PoolState {
    // Most recently returned at the front, oldest at the back.
    idle: VecDeque<IdleConnection>,
    total: usize,
    closed: bool,
}

struct PoolInner {
    config: Arc<HostConfig>,
    dialer: Arc<dyn Dialer>,
    clock: Arc<dyn Clock>,
    state: Mutex<PoolState>,
    slot_freed: Condvar,
}

enum Checkout {
    Idle(Box<dyn RawConnection>),
    Reserved,
}

/// Connection pool handle for one host.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates an empty pool; no connection is dialed until `get`.
    pub fn new(config: Arc<HostConfig>, dialer: Arc<dyn Dialer>, clock: Arc<dyn Clock>) -> Self {
        debug!(host = %config.name, address = %config.address, "creating connection pool");
        let state = PoolState {
            idle: VecDeque::with_capacity(config.options.max_idle.min(64)),
            total: 0,
            closed: false,
        };
        ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                dialer,
                clock,
                state: Mutex::new(state),
                slot_freed: Condvar::new(),
            }),
        }
    }

    /// Host configuration this pool was built from.
    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    /// Borrows a connection, reusing an idle one or dialing a new one.
    ///
    /// When the pool is at `max_active`, this either fails with
    /// `PoolExhausted` or, with `wait` set, blocks until a slot frees up.
    pub fn get(&self) -> KvResult<PooledConnection> {
        match self.checkout()? {
            Checkout::Idle(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
            Checkout::Reserved => match self.inner.dialer.dial(&self.inner.config) {
                Ok(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
                Err(err) => {
                    self.inner.release_slot();
                    Err(err)
                }
            },
        }
    }

    fn checkout(&self) -> KvResult<Checkout> {
        let options = &self.inner.config.options;
        let mut expired = Vec::new();
        let mut state = self.inner.state.lock();

        let checkout = loop {
            if state.closed {
                break Err(KvError::PoolClosed);
            }
            self.inner.prune_idle(&mut state, &mut expired);
            if let Some(idle) = state.idle.pop_front() {
                break Ok(Checkout::Idle(idle.conn));
            }
            if options.max_active == 0 || state.total < options.max_active {
                state.total += 1;
                break Ok(Checkout::Reserved);
            }
            if !options.wait {
                break Err(KvError::PoolExhausted);
            }
            self.inner.slot_freed.wait(&mut state);
        };

        drop(state);
        close_all(expired);
        checkout
    }

    /// Closes idle connections and refuses further borrows.
    ///
    /// Borrowed connections keep working; they are closed when returned.
    pub fn close(&self) {
        let idle = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.total = state.total.saturating_sub(idle.len());
            idle
        };
        self.inner.slot_freed.notify_all();
        debug!(host = %self.inner.config.name, idle = idle.len(), "connection pool closed");
        close_all(idle.into_iter().map(|idle| idle.conn).collect());
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Returns true when both handles point at the same pool.
    pub fn same_pool(&self, other: &ConnectionPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            idle: state.idle.len(),
            open: state.total,
            max_idle: self.inner.config.options.max_idle,
            max_active: self.inner.config.options.max_active,
            closed: state.closed,
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("host", &self.inner.config.name)
            .field("stats", &self.stats())
            .finish()
    }
}

impl PoolInner {
    /// Moves idle connections past the idle timeout into `expired`.
    fn prune_idle(&self, state: &mut PoolState, expired: &mut Vec<Box<dyn RawConnection>>) {
        let Some(timeout) = self.config.options.idle_timeout() else {
            return;
        };
        let now = self.clock.now();
        while let Some(oldest) = state.idle.back() {
            if now.saturating_duration_since(oldest.idle_since) < timeout {
                break;
            }
            if let Some(stale) = state.idle.pop_back() {
                state.total = state.total.saturating_sub(1);
                expired.push(stale.conn);
            }
        }
    }

    fn release_slot(&self) {
        {
            let mut state = self.state.lock();
            state.total = state.total.saturating_sub(1);
        }
        self.slot_freed.notify_one();
    }

    fn put(&self, conn: Box<dyn RawConnection>, reusable: bool) {
        let rejected = {
            let mut state = self.state.lock();
            if reusable && !state.closed && state.idle.len() < self.config.options.max_idle {
                state.idle.push_front(IdleConnection {
                    conn,
                    idle_since: self.clock.now(),
                });
                None
            } else {
                state.total = state.total.saturating_sub(1);
                Some(conn)
            }
        };
        self.slot_freed.notify_one();
        if let Some(conn) = rejected {
            close_all(vec![conn]);
        }
    }
}

fn close_all(conns: Vec<Box<dyn RawConnection>>) {
    for mut conn in conns {
        if let Err(err) = conn.close() {
            debug!(error = %err, "closing pooled connection failed");
        }
    }
}

/// RAII lease returning a connection to its pool on drop.
///
/// A lease is exclusive to one caller for one logical operation. Any IO or
/// framing failure marks it invalid so it is closed instead of reused.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Box<dyn RawConnection>>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Box<dyn RawConnection>) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Name of the host this connection belongs to.
    pub fn host(&self) -> &str {
        &self.pool.config.name
    }

    /// Drops the connection without returning it to the pool.
    pub fn discard(mut self) {
        self.valid = false;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    fn raw(&mut self) -> KvResult<&mut (dyn RawConnection + 'static)> {
        self.conn.as_deref_mut().ok_or(KvError::PoolClosed)
    }

    fn track<T>(&mut self, result: KvResult<T>) -> KvResult<T> {
        if let Err(err) = &result {
            if err.is_connection_fault() {
                self.valid = false;
            }
        }
        result
    }
}

impl RawConnection for PooledConnection {
    fn send(&mut self, args: &[&[u8]]) -> KvResult<()> {
        let result = self.raw()?.send(args);
        self.track(result)
    }

    fn flush(&mut self) -> KvResult<()> {
        let result = self.raw()?.flush();
        self.track(result)
    }

    fn receive(&mut self) -> KvResult<RespValue> {
        let result = self.raw()?.receive();
        self.track(result)
    }

    fn close(&mut self) -> KvResult<()> {
        self.valid = false;
        self.raw()?.close()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(conn, self.valid);
        }
    }
}
