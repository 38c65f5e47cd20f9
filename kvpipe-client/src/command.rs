//! # Single-Command Execution
//!
//! Purpose: Run exactly one command on a supervised connection and release
//! the connection on every exit path.
//!
//! Acquire failures (`UnknownHost`, `CircuitOpen`, ...) pass through
//! untouched; failures after a connection was obtained are wrapped in
//! `KvError::Command` naming the host and key.

use std::sync::Arc;
use std::time::Duration;

use kvpipe_common::{KvError, KvResult};

use crate::connection::RawConnection;
use crate::resp::RespValue;
use crate::supervisor::ConnectionSupervisor;

pub struct CommandExecutor {
    supervisor: Arc<ConnectionSupervisor>,
}

impl CommandExecutor {
    pub fn new(supervisor: Arc<ConnectionSupervisor>) -> Self {
        CommandExecutor { supervisor }
    }

    /// Sends `args` to `host` and returns the reply.
    ///
    /// `key` is only used to label errors. Error replies from the server are
    /// returned as `Command { source: Server { .. } }`.
    pub fn execute(&self, host: &str, key: &str, args: &[&[u8]]) -> KvResult<RespValue> {
        let mut conn = self.supervisor.acquire(host)?;
        match conn.exec(args) {
            Ok(RespValue::Error(message)) => Err(command_error(host, key, KvError::Server { message })),
            Ok(reply) => Ok(reply),
            Err(err) => Err(command_error(host, key, err)),
        }
    }

    /// `SET key value EX ttl`; returns the confirmation string (`"OK"`).
    pub fn set_with_expiry(&self, host: &str, key: &str, value: &str, ttl: Duration) -> KvResult<String> {
        let (seconds, len) = encode_ttl(ttl)?;
        let reply = self.execute(
            host,
            key,
            &[b"SET", key.as_bytes(), value.as_bytes(), b"EX", &seconds[..len]],
        )?;
        reply.into_string().map_err(|err| command_error(host, key, err))
    }
}

pub(crate) fn command_error(host: &str, key: &str, source: KvError) -> KvError {
    KvError::Command {
        host: host.to_string(),
        key: key.to_string(),
        source: Box::new(source),
    }
}

/// Encodes a whole-second TTL as ASCII digits; sub-second TTLs are rejected.
pub(crate) fn encode_ttl(ttl: Duration) -> KvResult<([u8; 20], usize)> {
    match ttl.as_secs() {
        0 => Err(KvError::InvalidTtl),
        secs => Ok(encode_u64(secs)),
    }
}

fn encode_u64(mut value: u64) -> ([u8; 20], usize) {
    // Stack buffer keeps conversion allocation-free.
    let mut buf = [0u8; 20];
    let mut len = 0;
    loop {
        buf[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
        if value == 0 {
            break;
        }
    }
    buf[..len].reverse();
    (buf, len)
}
