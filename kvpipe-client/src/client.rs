//! # Synchronous Client API
//!
//! Purpose: Expose one blocking entry point for registering hosts and writing
//! keys with expiry, either one at a time or as a pipelined batch.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVClient` hides the registry, breakers, pools and
//!    protocol details behind host names.
//! 2. **Owned State**: Every client has its own registry; nothing is global.
//! 3. **Injectable Seams**: `ClientBuilder` swaps the dialer, clock and
//!    breaker policy, which is how tests make outages deterministic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use kvpipe_common::{HostConfig, HostsFile, KvResult, PoolOptions, Transport};

use crate::breaker::{BreakerConfig, BreakerState};
use crate::clock::{Clock, SystemClock};
use crate::command::CommandExecutor;
use crate::connection::{Dialer, NetDialer};
use crate::pipeline::{BatchReport, PipelineExecutor};
use crate::pool::{PoolStats, PooledConnection};
use crate::registry::HostRegistry;
use crate::supervisor::ConnectionSupervisor;

/// Builder for a `KVClient` with non-default collaborators.
pub struct ClientBuilder {
    dialer: Arc<dyn Dialer>,
    clock: Arc<dyn Clock>,
    breaker: BreakerConfig,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder {
            dialer: Arc::new(NetDialer::new()),
            clock: Arc::new(SystemClock),
            breaker: BreakerConfig::default(),
        }
    }
}

impl ClientBuilder {
    /// Replaces the socket dialer (e.g. to set connect/IO timeouts).
    pub fn dialer(mut self, dialer: impl Dialer + 'static) -> Self {
        self.dialer = Arc::new(dialer);
        self
    }

    /// Replaces the time source used by breakers and idle timeouts.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Failure threshold and cooldown applied to every host's breaker.
    pub fn breaker(mut self, config: BreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    pub fn build(self) -> KVClient {
        let registry = Arc::new(HostRegistry::new(self.dialer, self.clock, self.breaker));
        let supervisor = Arc::new(ConnectionSupervisor::new(Arc::clone(&registry)));
        KVClient {
            registry,
            commands: CommandExecutor::new(Arc::clone(&supervisor)),
            pipeline: PipelineExecutor::new(Arc::clone(&supervisor)),
            supervisor,
        }
    }
}

/// Multi-host client with supervised, pooled connections.
///
/// Every call names its target host; hosts must be registered first.
pub struct KVClient {
    registry: Arc<HostRegistry>,
    supervisor: Arc<ConnectionSupervisor>,
    commands: CommandExecutor,
    pipeline: PipelineExecutor,
}

impl Default for KVClient {
    fn default() -> Self {
        Self::new()
    }
}

impl KVClient {
    /// Client with real sockets, the system clock and default breakers.
    pub fn new() -> Self {
        ClientBuilder::default().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Registers (or re-registers) a host. Nothing is dialed until first use.
    pub fn register(
        &self,
        name: impl Into<String>,
        address: impl Into<String>,
        transport: Transport,
        options: Option<PoolOptions>,
    ) {
        self.register_config(HostConfig::new(name, address, transport, options));
    }

    pub fn register_config(&self, config: HostConfig) {
        debug!(host = %config.name, address = %config.address, "registering host");
        self.registry.register(config);
    }

    /// Registers every host in `file`, in order.
    pub fn register_all(&self, file: &HostsFile) {
        for config in &file.hosts {
            self.register_config(config.clone());
        }
    }

    /// Writes `key = value` on `host`, expiring after `ttl` (whole seconds).
    pub fn set_with_expiry(&self, host: &str, key: &str, value: &str, ttl: Duration) -> KvResult<String> {
        self.commands.set_with_expiry(host, key, value, ttl)
    }

    /// Writes every entry of `items` in one round-trip.
    ///
    /// Returns only the keys the server confirmed; keys that failed are
    /// silently absent. Use `set_many_with_expiry_report` to see why.
    pub fn set_many_with_expiry(
        &self,
        host: &str,
        items: &HashMap<String, String>,
        ttl: Duration,
    ) -> KvResult<HashMap<String, String>> {
        self.pipeline
            .execute_batch(host, items, ttl)
            .map(|report| report.confirmed)
    }

    /// Like `set_many_with_expiry`, but keeps per-key failures.
    pub fn set_many_with_expiry_report(
        &self,
        host: &str,
        items: &HashMap<String, String>,
        ttl: Duration,
    ) -> KvResult<BatchReport> {
        self.pipeline.execute_batch(host, items, ttl)
    }

    /// Supervised connection for commands the client has no helper for.
    ///
    /// The connection returns to its pool when dropped.
    pub fn connection(&self, host: &str) -> KvResult<PooledConnection> {
        self.supervisor.acquire(host)
    }

    pub fn breaker_state(&self, host: &str) -> Option<BreakerState> {
        self.supervisor.breaker_state(host)
    }

    pub fn pool_stats(&self, host: &str) -> Option<PoolStats> {
        self.supervisor.pool_stats(host)
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }
}
