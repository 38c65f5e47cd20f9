//! # Pipeline Benchmark Harness
//!
//! Purpose: Show what pipelining buys by writing the same number of keys two
//! ways against one host: one `SET .. EX` round-trip per key, then a single
//! pipelined batch.
//!
//! ## Usage
//!
//! ```text
//! kvpipe-bench [address|mock] [keys] [ttl-seconds]
//! ```
//!
//! `mock` starts an embedded mock store instead of dialing a real server.
//! `KVPIPE_HOSTS=path.json` registers extra hosts from a hosts file first.
//!
//! ## Design Principles
//! 1. **Allocation Control**: The batch map is built before the clock starts.
//! 2. **Same Workload**: Both paths write `keys` entries with the same TTL.

use std::collections::HashMap;
use std::env;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kvpipe_client::{HostsFile, KVClient, PoolOptions, Transport};
use kvpipe_mock::MockServer;

const DEFAULT_ADDRESS: &str = "127.0.0.1:6379";
const DEFAULT_KEY_COUNT: usize = 100_000;
const DEFAULT_TTL_SECS: u64 = 10;
const HOST: &str = "bench";
const HOSTS_ENV: &str = "KVPIPE_HOSTS";

struct BenchConfig {
    /// `None` runs against an embedded mock store.
    address: Option<String>,
    key_count: usize,
    ttl: Duration,
}

impl BenchConfig {
    fn from_args() -> Result<Self> {
        Self::parse(env::args().skip(1))
    }

    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let address = match args.next() {
            Some(raw) if raw == "mock" => None,
            Some(raw) => Some(raw),
            None => Some(DEFAULT_ADDRESS.to_string()),
        };
        let key_count = parse_or(args.next(), DEFAULT_KEY_COUNT).context("invalid key count")?;
        if key_count == 0 {
            bail!("key count must be at least one");
        }
        let ttl_secs = parse_or(args.next(), DEFAULT_TTL_SECS).context("invalid ttl")?;
        if ttl_secs == 0 {
            bail!("ttl must be at least one second");
        }

        Ok(BenchConfig {
            address,
            key_count,
            ttl: Duration::from_secs(ttl_secs),
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, fallback: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => Ok(raw.parse()?),
        None => Ok(fallback),
    }
}

fn report(label: &str, ops: usize, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let micros_per_op = (secs * 1e6) / (ops as f64);
    println!(
        "{label}: {ops} keys in {secs:.3}s ({ops_per_sec:.0} keys/s, {micros_per_op:.1} us/key)"
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run() {
        eprintln!("kvpipe-bench failed: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = BenchConfig::from_args()?;
    let client = KVClient::new();

    if let Ok(path) = env::var(HOSTS_ENV) {
        let file = HostsFile::load(&path).with_context(|| format!("loading hosts file {path}"))?;
        client.register_all(&file);
        info!(path = %path, hosts = file.hosts.len(), "registered hosts from file");
    }

    let mock = match config.address {
        Some(_) => None,
        None => Some(MockServer::start().context("starting mock store")?),
    };
    let address = match (&config.address, &mock) {
        (Some(address), _) => address.clone(),
        (None, Some(server)) => server.address().to_string(),
        (None, None) => bail!("no address to benchmark against"),
    };

    let options = PoolOptions {
        max_active: 100,
        max_idle: 10,
        idle_timeout_secs: 3,
        wait: true,
    };
    client.register(HOST, address.clone(), Transport::Tcp, Some(options));
    info!(%address, keys = config.key_count, ttl = config.ttl.as_secs(), "starting benchmark");

    let mut failures = 0usize;
    let start = Instant::now();
    for i in 1..=config.key_count {
        let key = format!("single_process_{i}");
        if let Err(err) = client.set_with_expiry(HOST, &key, &i.to_string(), config.ttl) {
            if failures == 0 {
                warn!(error = %err, "single write failed");
            }
            failures += 1;
        }
    }
    report("single SET EX", config.key_count, start.elapsed());
    if failures > 0 {
        warn!(failures, "single writes failed");
    }

    let items: HashMap<String, String> = (1..=config.key_count)
        .map(|i| (format!("pipeline_key_{i}"), i.to_string()))
        .collect();
    let start = Instant::now();
    let batch = client
        .set_many_with_expiry_report(HOST, &items, config.ttl)
        .context("pipelined batch failed")?;
    report("pipelined SET EX", config.key_count, start.elapsed());

    println!(
        "pipeline: confirmed={}, failed={}, unanswered={}",
        batch.confirmed.len(),
        batch.failed.len(),
        batch.unanswered.len()
    );
    if let Some(err) = &batch.stream_error {
        warn!(error = %err, "pipeline stream broke while draining replies");
    }

    Ok(())
}
