//! # Pipelined Batch Writes
//!
//! Purpose: Write many keys with one network round-trip instead of one per
//! key.
//!
//! ## Protocol
//!
//! ```text
//! acquire ─▶ send SET k1 … EX t ─▶ … ─▶ send SET kN … EX t   (buffer only)
//!        ─▶ flush                                           (one write)
//!        ─▶ receive ×N, in queue order                      (drain)
//!        ─▶ release
//! ```
//!
//! ## Partial Failure
//! - An error or undecodable reply for one key fails that key only.
//! - An IO/framing error while draining leaves the reply stream unaligned:
//!   that key and every key not yet drained are reported `unanswered`, and
//!   the connection is discarded instead of pooled.
//! - Nothing is rolled back or retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use kvpipe_common::{KvError, KvResult};

use crate::command::encode_ttl;
use crate::connection::RawConnection;
use crate::supervisor::ConnectionSupervisor;

/// Per-key outcome of one pipelined batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Keys whose reply decoded cleanly, with the confirmation string.
    pub confirmed: HashMap<String, String>,
    /// Keys whose own reply was an error or undecodable.
    pub failed: HashMap<String, KvError>,
    /// Keys whose reply was never read because the stream broke.
    pub unanswered: Vec<String>,
    /// The stream failure that produced `unanswered`, if any.
    pub stream_error: Option<KvError>,
}

impl BatchReport {
    /// True when every key was confirmed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.unanswered.is_empty()
    }

    /// Number of keys not confirmed.
    pub fn failure_count(&self) -> usize {
        self.failed.len() + self.unanswered.len()
    }
}

pub struct PipelineExecutor {
    supervisor: Arc<ConnectionSupervisor>,
}

impl PipelineExecutor {
    pub fn new(supervisor: Arc<ConnectionSupervisor>) -> Self {
        PipelineExecutor { supervisor }
    }

    /// Writes every `key -> value` with expiry `ttl` over one connection.
    ///
    /// Returns `Err` only when no connection could be acquired (or the TTL is
    /// invalid); per-key problems are reported in the `BatchReport`.
    pub fn execute_batch(
        &self,
        host: &str,
        items: &HashMap<String, String>,
        ttl: Duration,
    ) -> KvResult<BatchReport> {
        let (seconds, len) = encode_ttl(ttl)?;
        if items.is_empty() {
            return Ok(BatchReport::default());
        }

        let mut conn = self.supervisor.acquire(host)?;
        let report = run_batch(&mut conn, items, &seconds[..len]);
        if report.is_complete() {
            debug!(host, keys = items.len(), "pipeline batch confirmed");
        } else {
            warn!(
                host,
                keys = items.len(),
                failed = report.failure_count(),
                stream_error = ?report.stream_error,
                "pipeline batch finished with failures"
            );
        }
        Ok(report)
    }
}

/// Write-then-drain over an already acquired connection.
pub(crate) fn run_batch(
    conn: &mut dyn RawConnection,
    items: &HashMap<String, String>,
    ttl_seconds: &[u8],
) -> BatchReport {
    let mut report = BatchReport::default();
    // Replies come back in queue order, so remember the order we queued in.
    let mut queued: Vec<&str> = Vec::with_capacity(items.len());

    for (key, value) in items {
        let args: [&[u8]; 5] = [b"SET", key.as_bytes(), value.as_bytes(), b"EX", ttl_seconds];
        if let Err(err) = conn.send(&args) {
            return abort(report, items.keys(), err);
        }
        queued.push(key);
    }

    if let Err(err) = conn.flush() {
        return abort(report, items.keys(), err);
    }

    let mut pending = queued.into_iter();
    while let Some(key) = pending.next() {
        match conn.receive() {
            Ok(reply) => match reply.into_string() {
                Ok(confirmation) => {
                    report.confirmed.insert(key.to_string(), confirmation);
                }
                Err(err) => {
                    report.failed.insert(key.to_string(), err);
                }
            },
            Err(err) => {
                let rest: Vec<&str> = std::iter::once(key).chain(pending).collect();
                return abort(report, rest, err);
            }
        }
    }
    report
}

fn abort<I, K>(mut report: BatchReport, keys: I, err: KvError) -> BatchReport
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    report
        .unanswered
        .extend(keys.into_iter().map(|key| key.as_ref().to_string()));
    report.stream_error = Some(err);
    report
}
