//! # Connection Supervisor
//!
//! Purpose: Answer "give me a usable connection for host H", probing liveness
//! and replacing the host's pool when the link is bad, all gated by the
//! host's circuit breaker.
//!
//! ## Acquire
//!
//! 1. Unregistered host: `UnknownHost`.
//! 2. Breaker refuses (open, or a half-open trial already running):
//!    `CircuitOpen`, without dialing.
//! 3. Borrow from the current pool and `PING`. Success settles the permit as
//!    a success and returns the connection.
//! 4. Otherwise discard the connection, record a breaker failure and swap in a
//!    new pool built from the registered config. If that failure opened the
//!    breaker, stop with `CircuitOpen`; else borrow from the new pool without
//!    probing again (`RebuildFailed` if even that fails).
//!
//! At most one rebuild happens per call; nothing here loops or retries.

use std::sync::Arc;

use tracing::{error, warn};

use kvpipe_common::{KvError, KvResult};

use crate::breaker::BreakerState;
use crate::connection::RawConnection;
use crate::pool::{ConnectionPool, PoolStats, PooledConnection};
use crate::registry::HostRegistry;
use crate::resp::RespValue;

pub struct ConnectionSupervisor {
    registry: Arc<HostRegistry>,
}

impl ConnectionSupervisor {
    pub fn new(registry: Arc<HostRegistry>) -> Self {
        ConnectionSupervisor { registry }
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    /// Returns a connection believed live, or `UnknownHost`, `CircuitOpen`,
    /// `RebuildFailed` (plus `PoolExhausted`/`PoolClosed` from the pool).
    pub fn acquire(&self, host: &str) -> KvResult<PooledConnection> {
        let pool = self.registry.pool(host).ok_or_else(|| unknown_host(host))?;
        let breaker = self.registry.breaker(host);
        let Some(permit) = breaker.try_acquire() else {
            warn!(host, "circuit breaker open, failing fast");
            return Err(circuit_open(host));
        };

        let (pool, borrowed) = self.borrow(host, pool);
        let fault = match borrowed {
            Ok(mut conn) => match probe(&mut conn) {
                Ok(()) => {
                    permit.success();
                    return Ok(conn);
                }
                Err(err) => {
                    conn.discard();
                    err
                }
            },
            // Capacity problems say nothing about host health.
            Err(err @ (KvError::PoolExhausted | KvError::PoolClosed | KvError::UnknownHost { .. })) => {
                return Err(err)
            }
            Err(err) => err,
        };

        warn!(host, error = %fault, "liveness probe failed, rebuilding pool");
        let opened = permit.failure();
        let (fresh, _) = self.registry.replace_pool(host, &pool)?;
        if opened {
            warn!(host, "circuit breaker opened");
            return Err(circuit_open(host));
        }

        // Handed out unprobed: a still-broken link surfaces on first use.
        fresh.get().map_err(|source| {
            error!(host, error = %source, "rebuilt pool could not provide a connection");
            KvError::RebuildFailed {
                host: host.to_string(),
                source: Box::new(source),
            }
        })
    }

    /// Borrows from `pool`, falling back to the current pool once if `pool`
    /// was closed by a concurrent rebuild after it was looked up.
    fn borrow(
        &self,
        host: &str,
        pool: ConnectionPool,
    ) -> (ConnectionPool, KvResult<PooledConnection>) {
        match pool.get() {
            Err(KvError::PoolClosed) => match self.registry.pool(host) {
                Some(current) => {
                    let borrowed = current.get();
                    (current, borrowed)
                }
                None => (pool, Err(unknown_host(host))),
            },
            borrowed => (pool, borrowed),
        }
    }

    /// Breaker state, or `None` before the host was first acquired.
    pub fn breaker_state(&self, host: &str) -> Option<BreakerState> {
        self.registry.existing_breaker(host).map(|breaker| breaker.state())
    }

    pub fn pool_stats(&self, host: &str) -> Option<PoolStats> {
        self.registry.pool(host).map(|pool| pool.stats())
    }
}

fn probe(conn: &mut PooledConnection) -> KvResult<()> {
    match conn.exec(&[b"PING"])? {
        reply if reply.is_pong() => Ok(()),
        RespValue::Error(message) => Err(KvError::Server { message }),
        _ => Err(KvError::UnexpectedResponse),
    }
}

fn unknown_host(host: &str) -> KvError {
    KvError::UnknownHost {
        host: host.to_string(),
    }
}

fn circuit_open(host: &str) -> KvError {
    KvError::CircuitOpen {
        host: host.to_string(),
    }
}
