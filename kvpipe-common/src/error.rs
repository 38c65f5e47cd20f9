//! # Error Taxonomy
//!
//! Purpose: One error type for every layer of the client, from socket I/O up
//! to host supervision, so callers can match on a single enum.
//!
//! ## Design Principles
//! 1. **Context Carrying**: Supervision and command errors name the host and,
//!    when there is one, the key.
//! 2. **Connection Hygiene**: `is_connection_fault` tells the pool whether a
//!    connection is still in sync with the server after an error.
//! 3. **No Process-Fatal Paths**: Everything is a returned value.

use thiserror::Error;

/// Result alias used across kvpipe crates.
pub type KvResult<T> = Result<T, KvError>;

/// Errors surfaced by kvpipe.
#[derive(Debug, Error)]
pub enum KvError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// RESP2 framing or parse error.
    #[error("protocol error")]
    Protocol,
    /// Server returned an error reply.
    #[error("server error: {}", String::from_utf8_lossy(.message))]
    Server { message: Vec<u8> },
    /// Response type did not match the expected command response.
    #[error("unexpected response")]
    UnexpectedResponse,
    /// Pool is at capacity and is not configured to wait.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// Pool was closed while a caller was borrowing from it.
    #[error("connection pool closed")]
    PoolClosed,
    /// Address could not be parsed for the configured transport.
    #[error("invalid address")]
    InvalidAddress,
    /// Transport is not available on this platform.
    #[error("unsupported transport")]
    UnsupportedTransport,
    /// Expiry shorter than one second.
    #[error("ttl must be at least one second")]
    InvalidTtl,
    /// Could not open a connection to the host address.
    #[error("dial {address} failed: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },
    /// No registration exists for the host name.
    #[error("unknown host `{host}`")]
    UnknownHost { host: String },
    /// The host's circuit breaker is open; back off and retry later.
    #[error("circuit breaker open for host `{host}`")]
    CircuitOpen { host: String },
    /// A replacement pool was installed but could not produce a connection.
    #[error("rebuilding pool for host `{host}` failed: {source}")]
    RebuildFailed {
        host: String,
        #[source]
        source: Box<KvError>,
    },
    /// A command against a specific key failed.
    #[error("command on host `{host}` key `{key}` failed: {source}")]
    Command {
        host: String,
        key: String,
        #[source]
        source: Box<KvError>,
    },
    /// Invalid configuration content.
    #[error("config error: {0}")]
    Config(String),
    /// Configuration file could not be decoded.
    #[error("config decode error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KvError {
    /// Returns true when the error leaves the connection unusable.
    ///
    /// Server error replies and type mismatches are complete frames, so the
    /// reply stream is still aligned; IO and framing errors are not.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            KvError::Io(_) | KvError::Protocol | KvError::Dial { .. }
        )
    }

    /// Returns the host name carried by supervision and command errors.
    pub fn host(&self) -> Option<&str> {
        match self {
            KvError::UnknownHost { host }
            | KvError::CircuitOpen { host }
            | KvError::RebuildFailed { host, .. }
            | KvError::Command { host, .. } => Some(host),
            _ => None,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        KvError::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_reply_keeps_connection() {
        let err = KvError::Server {
            message: b"ERR wrong type".to_vec(),
        };
        assert!(!err.is_connection_fault());
        assert_eq!(err.to_string(), "server error: ERR wrong type");
    }

    #[test]
    fn io_and_protocol_are_connection_faults() {
        let io = KvError::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(io.is_connection_fault());
        assert!(KvError::Protocol.is_connection_fault());
    }

    #[test]
    fn command_error_names_host_and_key() {
        let err = KvError::Command {
            host: "cache-a".to_string(),
            key: "user:1".to_string(),
            source: Box::new(KvError::UnexpectedResponse),
        };
        assert_eq!(err.host(), Some("cache-a"));
        assert_eq!(
            err.to_string(),
            "command on host `cache-a` key `user:1` failed: unexpected response"
        );
    }
}
