//! # kvpipe Client
//!
//! Purpose: Keep named Redis-compatible hosts reachable behind supervised
//! connection pools, and write large key sets with one pipelined round-trip.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse connections per host; dial lazily.
//! 2. **Circuit Breaker**: Fail fast against hosts known to be down instead of
//!    storming them with reconnects.
//! 3. **Replace, Don't Repair**: A host whose link goes bad gets a brand-new
//!    pool built from its registered configuration.
//! 4. **Write-Then-Drain Pipelining**: Queue every request, flush once, read
//!    replies in order; one bad reply never fails the batch.
//!
//! ## Layering
//!
//! ```text
//! KVClient
//!   ├── CommandExecutor ──┐
//!   └── PipelineExecutor ─┤
//!                         ▼
//!              ConnectionSupervisor
//!                         │
//!                         ▼
//!   HostRegistry { configs, pools, breakers }
//!                         │
//!                         ▼
//!        ConnectionPool ── Dialer ── RawConnection (RESP2)
//! ```

mod breaker;
mod client;
mod clock;
mod command;
mod connection;
mod pipeline;
mod pool;
mod registry;
mod resp;
mod supervisor;

#[cfg(test)]
mod test_support;

pub use breaker::{BreakerConfig, BreakerPermit, BreakerState, CircuitBreaker};
pub use client::{ClientBuilder, KVClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::CommandExecutor;
pub use connection::{Closable, Dialer, NetDialer, RawConnection, StreamConnection};
pub use kvpipe_common::{
    HostConfig, HostsFile, KvError, KvResult, PoolOptions, Transport,
};
pub use pipeline::{BatchReport, PipelineExecutor};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use registry::HostRegistry;
pub use resp::{encode_command, read_response, RespValue, MAX_ARRAY_LEN, MAX_BULK_LEN, MAX_NESTING};
pub use supervisor::ConnectionSupervisor;
