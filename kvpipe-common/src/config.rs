//! # Host Configuration
//!
//! Purpose: Describe how to reach a named host and how to size its pool, in a
//! form that can be written by hand in a JSON hosts file.
//!
//! ## Design Principles
//! 1. **Immutable Registration**: A `HostConfig` is never mutated after it is
//!    registered; every pool rebuild reuses it verbatim.
//! 2. **Defaults on Omission**: Missing option fields fall back to the same
//!    defaults as a registration without options.
//!
//! ## Example
//!
//! ```text
//! {
//!   "hosts": [
//!     { "name": "cache-a", "address": "127.0.0.1:6379" },
//!     { "name": "cache-b", "address": "/run/kv.sock", "transport": "unix",
//!       "options": { "max_active": 64, "wait": true } }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KvError, KvResult};

/// Default number of idle connections kept per pool.
pub const DEFAULT_MAX_IDLE: usize = 10;

/// Default cap on connections (idle + in use) per pool.
pub const DEFAULT_MAX_ACTIVE: usize = 1000;

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1;

/// Transport used to reach a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// TCP socket, address is `host:port`.
    #[default]
    Tcp,
    /// Unix domain socket, address is a filesystem path.
    Unix,
}

/// Pool sizing and timeout options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Maximum idle connections retained; 0 keeps none.
    pub max_idle: usize,
    /// Maximum connections (idle + in use); 0 means unbounded.
    pub max_active: usize,
    /// Seconds an idle connection may sit in the pool before it is discarded.
    pub idle_timeout_secs: u64,
    /// Block instead of failing when `max_active` is reached.
    pub wait: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            max_idle: DEFAULT_MAX_IDLE,
            max_active: DEFAULT_MAX_ACTIVE,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            wait: false,
        }
    }
}

impl PoolOptions {
    /// Idle timeout as a `Duration`; `None` when configured as zero.
    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Everything needed to (re)build the pool for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Unique host name used as the registry key.
    pub name: String,
    /// `host:port` for TCP, socket path for Unix.
    pub address: String,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub options: PoolOptions,
}

impl HostConfig {
    /// Builds a config, falling back to default options when none are given.
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        transport: Transport,
        options: Option<PoolOptions>,
    ) -> Self {
        HostConfig {
            name: name.into(),
            address: address.into(),
            transport,
            options: options.unwrap_or_default(),
        }
    }
}

/// A set of host registrations loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostsFile {
    pub hosts: Vec<HostConfig>,
}

impl HostsFile {
    /// Parses a hosts document and rejects entries without a name or address.
    pub fn from_json_str(raw: &str) -> KvResult<Self> {
        let file: HostsFile = serde_json::from_str(raw)?;
        for host in &file.hosts {
            if host.name.is_empty() {
                return Err(KvError::config("host entry without a name"));
            }
            if host.address.is_empty() {
                return Err(KvError::config(format!(
                    "host `{}` has an empty address",
                    host.name
                )));
            }
        }
        Ok(file)
    }

    /// Reads and parses a hosts file from disk.
    pub fn load(path: impl AsRef<Path>) -> KvResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}
