//! # Host Registry
//!
//! Purpose: Own, per host name, the registered configuration, the current
//! connection pool and the circuit breaker.
//!
//! ## Design Principles
//! 1. **Owned, Not Global**: Each `KVClient` holds its own registry, so tests
//!    can run independent instances side by side.
//! 2. **Per-Host Locking**: `DashMap` shards keep unrelated hosts from
//!    contending on one lock.
//! 3. **Whole-Pool Swaps**: Readers see either the old or the new pool, never
//!    a half-built one.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use kvpipe_common::{HostConfig, KvError, KvResult};

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::clock::Clock;
use crate::connection::Dialer;
use crate::pool::ConnectionPool;

pub struct HostRegistry {
    configs: DashMap<String, Arc<HostConfig>>,
    pools: DashMap<String, ConnectionPool>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    dialer: Arc<dyn Dialer>,
    clock: Arc<dyn Clock>,
    breaker_config: BreakerConfig,
}

impl HostRegistry {
    pub fn new(dialer: Arc<dyn Dialer>, clock: Arc<dyn Clock>, breaker_config: BreakerConfig) -> Self {
        HostRegistry {
            configs: DashMap::new(),
            pools: DashMap::new(),
            breakers: DashMap::new(),
            dialer,
            clock,
            breaker_config,
        }
    }

    /// Stores the host configuration and installs a fresh, undialed pool.
    ///
    /// A later registration under the same name wins. The previous pool is
    /// not closed: connections already borrowed from it finish normally.
    pub fn register(&self, config: HostConfig) {
        let name = config.name.clone();
        let config = Arc::new(config);
        let pool = self.build_pool(&config);
        self.configs.insert(name.clone(), config);
        if self.pools.insert(name.clone(), pool).is_some() {
            debug!(host = %name, "host re-registered, new pool installed");
        }
    }

    pub fn contains(&self, host: &str) -> bool {
        self.configs.contains_key(host)
    }

    pub fn config(&self, host: &str) -> Option<Arc<HostConfig>> {
        self.configs.get(host).map(|entry| Arc::clone(entry.value()))
    }

    /// Current pool for the host.
    pub fn pool(&self, host: &str) -> Option<ConnectionPool> {
        self.pools.get(host).map(|entry| entry.value().clone())
    }

    /// Breaker for the host, created on first use.
    pub fn breaker(&self, host: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(host) {
            return Arc::clone(existing.value());
        }
        self.breakers
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.breaker_config, self.clock.clone())))
            .value()
            .clone()
    }

    /// Breaker for the host only if one was already created.
    pub fn existing_breaker(&self, host: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(host).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered host names.
    pub fn hosts(&self) -> Vec<String> {
        self.configs.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Replaces `stale` with a new pool built from the registered config.
    ///
    /// The swap is conditional: if another caller (or a re-registration)
    /// already replaced `stale`, the pool currently installed is returned
    /// and nothing new is built. The superseded pool is closed.
    ///
    /// Returns the current pool and whether this call built it.
    pub fn replace_pool(&self, host: &str, stale: &ConnectionPool) -> KvResult<(ConnectionPool, bool)> {
        let config = self.config(host).ok_or_else(|| KvError::UnknownHost {
            host: host.to_string(),
        })?;

        let (fresh, superseded) = {
            let mut slot = self.pools.get_mut(host).ok_or_else(|| KvError::UnknownHost {
                host: host.to_string(),
            })?;
            if !slot.same_pool(stale) {
                debug!(host, "pool already replaced by a concurrent caller");
                return Ok((slot.clone(), false));
            }
            let fresh = self.build_pool(&config);
            let superseded = std::mem::replace(&mut *slot, fresh.clone());
            (fresh, superseded)
        };

        warn!(host, address = %config.address, "replaced connection pool");
        superseded.close();
        Ok((fresh, true))
    }

    fn build_pool(&self, config: &Arc<HostConfig>) -> ConnectionPool {
        ConnectionPool::new(Arc::clone(config), self.dialer.clone(), self.clock.clone())
    }
}
