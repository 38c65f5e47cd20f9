//! # Connections and Dialing
//!
//! Purpose: Define the minimal capability every store connection offers
//! (`send`, `flush`, `receive`, `close`) and the dialer seam that opens them.
//!
//! ## Design Principles
//! 1. **Capability Interface**: Pools, the supervisor and the executors only
//!    see `RawConnection`, so any compliant client can sit underneath.
//! 2. **Buffered Pipelining**: `send` only appends to the outbound buffer;
//!    nothing reaches the socket until `flush`.
//! 3. **Strategy Pattern**: `Dialer` is swappable, which is how tests count
//!    and script dials.

use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use kvpipe_common::{HostConfig, KvError, KvResult, Transport};

use crate::resp::{encode_command, read_response, RespValue};

/// Minimal operations expected from a key-value store connection.
pub trait RawConnection: Send {
    /// Queues one command on the outbound buffer without waiting for a reply.
    fn send(&mut self, args: &[&[u8]]) -> KvResult<()>;

    /// Writes every queued command to the peer.
    fn flush(&mut self) -> KvResult<()>;

    /// Reads exactly one reply, in the order commands were queued.
    fn receive(&mut self) -> KvResult<RespValue>;

    /// Shuts the connection down; later calls fail.
    fn close(&mut self) -> KvResult<()>;

    /// Sends one command and waits for its reply.
    fn exec(&mut self, args: &[&[u8]]) -> KvResult<RespValue> {
        self.send(args)?;
        self.flush()?;
        self.receive()
    }
}

/// Streams that can be shut down in both directions.
pub trait Closable {
    fn shutdown_both(&self) -> io::Result<()>;
}

impl Closable for TcpStream {
    fn shutdown_both(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

#[cfg(unix)]
impl Closable for std::os::unix::net::UnixStream {
    fn shutdown_both(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// RESP2 connection over any byte stream, with reusable buffers.
///
/// The buffers live on the connection to avoid per-call allocations.
pub struct StreamConnection<S: Read + Write> {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<S>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
    closed: bool,
}

impl<S: Read + Write> StreamConnection<S> {
    pub fn new(stream: S) -> Self {
        StreamConnection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
            closed: false,
        }
    }

    fn ensure_open(&self) -> KvResult<()> {
        if self.closed {
            return Err(KvError::Io(io::ErrorKind::NotConnected.into()));
        }
        Ok(())
    }
}

impl<S> RawConnection for StreamConnection<S>
where
    S: Read + Write + Closable + Send,
{
    fn send(&mut self, args: &[&[u8]]) -> KvResult<()> {
        self.ensure_open()?;
        encode_command(args, &mut self.write_buf);
        Ok(())
    }

    fn flush(&mut self) -> KvResult<()> {
        self.ensure_open()?;
        if self.write_buf.is_empty() {
            return Ok(());
        }
        let stream = self.reader.get_mut();
        let written = stream.write_all(&self.write_buf).and_then(|_| stream.flush());
        self.write_buf.clear();
        written.map_err(KvError::from)
    }

    fn receive(&mut self) -> KvResult<RespValue> {
        self.ensure_open()?;
        read_response(&mut self.reader, &mut self.line_buf)
    }

    fn close(&mut self) -> KvResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.write_buf.clear();
        match self.reader.get_ref().shutdown_both() {
            // The peer may already be gone; that still leaves us closed.
            Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// Opens connections for a host.
pub trait Dialer: Send + Sync {
    fn dial(&self, config: &HostConfig) -> KvResult<Box<dyn RawConnection>>;
}

/// Dialer for real sockets (TCP, and Unix domain sockets on Unix).
#[derive(Debug, Clone, Default)]
pub struct NetDialer {
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
}

impl NetDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds how long a TCP connect may take.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets socket read/write timeouts on every dialed connection.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    fn dial_tcp(&self, address: &str) -> io::Result<TcpStream> {
        let addr = address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable))?;
        let stream = match self.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
            None => TcpStream::connect(addr)?,
        };
        stream.set_read_timeout(self.io_timeout)?;
        stream.set_write_timeout(self.io_timeout)?;
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    #[cfg(unix)]
    fn dial_unix(&self, path: &str) -> KvResult<Box<dyn RawConnection>> {
        use std::os::unix::net::UnixStream;

        let dial = || -> io::Result<UnixStream> {
            let stream = UnixStream::connect(path)?;
            stream.set_read_timeout(self.io_timeout)?;
            stream.set_write_timeout(self.io_timeout)?;
            Ok(stream)
        };
        let stream = dial().map_err(|source| KvError::Dial {
            address: path.to_string(),
            source,
        })?;
        Ok(Box::new(StreamConnection::new(stream)))
    }

    #[cfg(not(unix))]
    fn dial_unix(&self, _path: &str) -> KvResult<Box<dyn RawConnection>> {
        Err(KvError::UnsupportedTransport)
    }
}

impl Dialer for NetDialer {
    fn dial(&self, config: &HostConfig) -> KvResult<Box<dyn RawConnection>> {
        if config.address.is_empty() {
            return Err(KvError::InvalidAddress);
        }
        match config.transport {
            Transport::Tcp => {
                let stream = self.dial_tcp(&config.address).map_err(|source| {
                    match source.kind() {
                        io::ErrorKind::InvalidInput => KvError::InvalidAddress,
                        _ => KvError::Dial {
                            address: config.address.clone(),
                            source,
                        },
                    }
                })?;
                Ok(Box::new(StreamConnection::new(stream)))
            }
            Transport::Unix => self.dial_unix(&config.address),
        }
    }
}
