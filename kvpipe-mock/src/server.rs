//! # Mock RESP Server
//!
//! Purpose: Run a small Redis-compatible server inside a test process, with
//! switches that make it misbehave on demand.
//!
//! ## Design Principles
//! 1. **Own Runtime**: The tokio runtime lives on a dedicated thread, so
//!    blocking callers can start and stop a server without being async.
//! 2. **Pipeline Friendly**: Every complete request in the read buffer is
//!    answered, and the answers are queued for the writer as one chunk.
//! 3. **Fault Injection**: Failing pings, poisoned keys and dropped
//!    connections stand in for an unhealthy host.
//!
//! ## Commands
//!
//! `PING [msg]`, `GET k`, `SET k v [EX s]`, `SETEX k s v`, `DEL k…`,
//! `EXPIRE k s`, `TTL k`.

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::store::{MemoryStore, TtlStatus};

/// Request limits, matching the server defaults for multibulk and bulk sizes.
const MAX_REQUEST_ARGS: usize = 1024 * 1024;
const MAX_ARG_LEN: usize = 512 * 1024 * 1024;

/// Shared state behind one server: data, fault switches and counters.
#[derive(Debug, Default)]
struct MockState {
    store: MemoryStore,
    fail_pings: AtomicBool,
    drop_connections: AtomicBool,
    poisoned: Mutex<HashSet<Vec<u8>>>,
    accepted: AtomicU64,
    commands: AtomicU64,
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
}

enum BoundListener {
    Tcp(std::net::TcpListener),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixListener),
}

/// Handle to a running mock server; dropping it stops the server.
pub struct MockServer {
    address: String,
    state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    #[cfg(unix)]
    socket_path: Option<PathBuf>,
}

impl MockServer {
    /// Starts a TCP server on an ephemeral loopback port.
    pub fn start() -> io::Result<Self> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let address = listener.local_addr()?.to_string();
        Self::launch(BoundListener::Tcp(listener), address)
    }

    /// Starts a server on a Unix domain socket at `path`.
    #[cfg(unix)]
    pub fn start_unix(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let listener = std::os::unix::net::UnixListener::bind(&path)?;
        let address = path.to_string_lossy().into_owned();
        let mut server = Self::launch(BoundListener::Unix(listener), address)?;
        server.socket_path = Some(path);
        Ok(server)
    }

    fn launch(bound: BoundListener, address: String) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("kvpipe-mock")
            .enable_all()
            .build()?;
        match &bound {
            BoundListener::Tcp(listener) => listener.set_nonblocking(true)?,
            #[cfg(unix)]
            BoundListener::Unix(listener) => listener.set_nonblocking(true)?,
        }

        let state = Arc::new(MockState::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let thread = {
            let state = Arc::clone(&state);
            let address = address.clone();
            thread::Builder::new()
                .name("kvpipe-mock-accept".to_string())
                .spawn(move || run(runtime, bound, state, shutdown_rx, address))?
        };

        debug!(%address, "mock server started");
        Ok(MockServer {
            address,
            state,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
            #[cfg(unix)]
            socket_path: None,
        })
    }

    /// `host:port` for TCP servers, the socket path for Unix servers.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// TCP socket address; `None` for Unix servers.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.address.parse().ok()
    }

    /// Makes `PING` answer with an error reply.
    pub fn set_fail_pings(&self, fail: bool) {
        self.state.fail_pings.store(fail, Ordering::SeqCst);
    }

    /// Closes new connections as soon as they are accepted, and live ones on
    /// their next request.
    pub fn set_drop_connections(&self, drop: bool) {
        self.state.drop_connections.store(drop, Ordering::SeqCst);
    }

    /// Makes writes to `key` answer with an error reply.
    pub fn poison_key(&self, key: &[u8]) {
        self.state.poisoned.lock().insert(key.to_vec());
    }

    pub fn clear_poison(&self) {
        self.state.poisoned.lock().clear();
    }

    /// Connections accepted so far, including dropped ones.
    pub fn accepted(&self) -> u64 {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Requests processed so far.
    pub fn commands(&self) -> u64 {
        self.state.commands.load(Ordering::SeqCst)
    }

    /// Direct access to the stored data.
    pub fn store(&self) -> &MemoryStore {
        &self.state.store
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(address = %self.address, "mock server thread panicked");
            }
        }
        #[cfg(unix)]
        if let Some(path) = self.socket_path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn run(
    runtime: Runtime,
    bound: BoundListener,
    state: Arc<MockState>,
    shutdown: oneshot::Receiver<()>,
    address: String,
) {
    let served = runtime.block_on(async move {
        let listener = match bound {
            BoundListener::Tcp(listener) => Listener::Tcp(TcpListener::from_std(listener)?),
            #[cfg(unix)]
            BoundListener::Unix(listener) => {
                Listener::Unix(tokio::net::UnixListener::from_std(listener)?)
            }
        };
        accept_loop(listener, state, shutdown).await;
        Ok::<(), io::Error>(())
    });
    if let Err(err) = served {
        error!(%address, error = %err, "mock server failed to start");
    }
    // Dropping the runtime cancels every connection task.
    runtime.shutdown_timeout(Duration::from_millis(100));
    debug!(%address, "mock server stopped");
}

async fn accept_loop(listener: Listener, state: Arc<MockState>, mut shutdown: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept(&state) => {
                if let Err(err) = accepted {
                    debug!(error = %err, "accept failed");
                }
            }
        }
    }
}

impl Listener {
    async fn accept(&self, state: &Arc<MockState>) -> io::Result<()> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                stream.set_nodelay(true)?;
                spawn_connection(stream, Arc::clone(state));
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                spawn_connection(stream, Arc::clone(state));
            }
        }
        Ok(())
    }
}

fn spawn_connection<S>(stream: S, state: Arc<MockState>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    state.accepted.fetch_add(1, Ordering::SeqCst);
    if state.drop_connections.load(Ordering::SeqCst) {
        debug!("dropping accepted connection");
        drop(stream);
        return;
    }
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, state).await {
            debug!(error = %err, "mock connection closed with error");
        }
    });
}

/// Serves one client until it disconnects, sends garbage, or is dropped.
async fn handle_connection<S>(stream: S, state: Arc<MockState>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    // Unbounded like a Redis client output buffer: reading never waits on
    // the peer draining replies.
    let (replies, mut pending) = mpsc::unbounded_channel::<Vec<u8>>();
    let flusher = tokio::spawn(async move {
        while let Some(chunk) = pending.recv().await {
            writer.write_all(&chunk).await?;
        }
        writer.shutdown().await
    });

    let served = read_requests(&mut reader, &state, &replies).await;
    drop(replies);
    let flushed = flusher
        .await
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    served.and(flushed)
}

async fn read_requests<R>(
    reader: &mut R,
    state: &MockState,
    replies: &mpsc::UnboundedSender<Vec<u8>>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(8 * 1024);

    loop {
        let bytes = reader.read_buf(&mut buffer).await?;
        if bytes == 0 {
            return Ok(());
        }

        let mut out = Vec::with_capacity(1024);
        loop {
            match parse_request(&mut buffer) {
                Ok(Some(args)) => {
                    if state.drop_connections.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    state.commands.fetch_add(1, Ordering::SeqCst);
                    dispatch_command(&args, state, &mut out);
                }
                Ok(None) => break,
                Err(()) => {
                    resp_error(&mut out, "protocol error");
                    let _ = replies.send(out);
                    return Ok(());
                }
            }
        }

        // A closed channel means the writer already failed.
        if !out.is_empty() && replies.send(out).is_err() {
            return Ok(());
        }
    }
}

/// Parses one RESP array of bulk strings from the front of `buffer`.
///
/// Returns `Ok(None)` until a whole request is buffered; consumes nothing in
/// that case. Counts and lengths above the request limits are errors.
fn parse_request(buffer: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, ()> {
    let mut pos = 0;
    let Some(header) = read_line(buffer, &mut pos) else {
        return Ok(None);
    };
    if header.first() != Some(&b'*') {
        return Err(());
    }
    let count = parse_length(&header[1..], MAX_REQUEST_ARGS)?;

    let mut args = Vec::with_capacity(count.min(16));
    for _ in 0..count {
        let Some(line) = read_line(buffer, &mut pos) else {
            return Ok(None);
        };
        if line.first() != Some(&b'$') {
            return Err(());
        }
        let len = parse_length(&line[1..], MAX_ARG_LEN)?;
        let end = pos.checked_add(len).ok_or(())?;
        let framed = end.checked_add(2).ok_or(())?;
        if buffer.len() < framed {
            return Ok(None);
        }
        if &buffer[end..framed] != b"\r\n" {
            return Err(());
        }
        args.push(buffer[pos..end].to_vec());
        pos = framed;
    }

    buffer.advance(pos);
    Ok(Some(args))
}

fn parse_length(digits: &[u8], max: usize) -> Result<usize, ()> {
    parse_u64(digits)
        .and_then(|value| usize::try_from(value).ok())
        .filter(|value| *value <= max)
        .ok_or(())
}

/// Returns the line starting at `pos` without its CRLF and moves `pos` past it.
fn read_line<'a>(buffer: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let rest = &buffer[*pos..];
    let end = rest.windows(2).position(|window| window == b"\r\n")?;
    *pos += end + 2;
    Some(&rest[..end])
}

fn dispatch_command(args: &[Vec<u8>], state: &MockState, out: &mut Vec<u8>) {
    let Some(cmd) = args.first() else {
        return resp_error(out, "empty command");
    };
    if cmd.eq_ignore_ascii_case(b"PING") {
        return handle_ping(args, state, out);
    }
    if cmd.eq_ignore_ascii_case(b"GET") {
        return handle_get(args, state, out);
    }
    if cmd.eq_ignore_ascii_case(b"SET") {
        return handle_set(args, state, out);
    }
    if cmd.eq_ignore_ascii_case(b"SETEX") {
        return handle_setex(args, state, out);
    }
    if cmd.eq_ignore_ascii_case(b"DEL") {
        return handle_del(args, state, out);
    }
    if cmd.eq_ignore_ascii_case(b"EXPIRE") {
        return handle_expire(args, state, out);
    }
    if cmd.eq_ignore_ascii_case(b"TTL") {
        return handle_ttl(args, state, out);
    }
    resp_error(out, "unknown command");
}

fn handle_ping(args: &[Vec<u8>], state: &MockState, out: &mut Vec<u8>) {
    if state.fail_pings.load(Ordering::SeqCst) {
        return resp_error(out, "ping refused");
    }
    match args.len() {
        1 => resp_simple(out, "PONG"),
        2 => resp_bulk(out, &args[1]),
        _ => resp_error(out, "wrong number of arguments for PING"),
    }
}

fn handle_get(args: &[Vec<u8>], state: &MockState, out: &mut Vec<u8>) {
    if args.len() != 2 {
        return resp_error(out, "wrong number of arguments for GET");
    }
    match state.store.get(&args[1]) {
        Some(value) => resp_bulk(out, &value),
        None => resp_null(out),
    }
}

fn handle_set(args: &[Vec<u8>], state: &MockState, out: &mut Vec<u8>) {
    let ttl = match args.len() {
        3 => None,
        5 if args[3].eq_ignore_ascii_case(b"EX") => match parse_seconds(&args[4]) {
            Some(ttl) => Some(ttl),
            None => return resp_error(out, "invalid expire time in SET"),
        },
        n if n < 3 => return resp_error(out, "wrong number of arguments for SET"),
        _ => return resp_error(out, "unsupported SET options"),
    };
    write_value(state, &args[1], &args[2], ttl, out);
}

fn handle_setex(args: &[Vec<u8>], state: &MockState, out: &mut Vec<u8>) {
    if args.len() != 4 {
        return resp_error(out, "wrong number of arguments for SETEX");
    }
    let Some(ttl) = parse_seconds(&args[2]) else {
        return resp_error(out, "invalid expire time in SETEX");
    };
    write_value(state, &args[1], &args[3], Some(ttl), out);
}

fn write_value(state: &MockState, key: &[u8], value: &[u8], ttl: Option<Duration>, out: &mut Vec<u8>) {
    if state.poisoned.lock().contains(key) {
        return resp_error(out, "poisoned key");
    }
    state.store.set(key.to_vec(), value.to_vec(), ttl);
    resp_simple(out, "OK");
}

fn handle_del(args: &[Vec<u8>], state: &MockState, out: &mut Vec<u8>) {
    if args.len() < 2 {
        return resp_error(out, "wrong number of arguments for DEL");
    }
    let removed = args[1..].iter().filter(|key| state.store.delete(key)).count();
    resp_integer(out, removed as i64);
}

fn handle_expire(args: &[Vec<u8>], state: &MockState, out: &mut Vec<u8>) {
    if args.len() != 3 {
        return resp_error(out, "wrong number of arguments for EXPIRE");
    }
    let Some(ttl) = parse_u64(&args[2]).map(Duration::from_secs) else {
        return resp_error(out, "value is not an integer or out of range");
    };
    resp_integer(out, i64::from(state.store.expire(&args[1], ttl)));
}

fn handle_ttl(args: &[Vec<u8>], state: &MockState, out: &mut Vec<u8>) {
    if args.len() != 2 {
        return resp_error(out, "wrong number of arguments for TTL");
    }
    let value = match state.store.ttl(&args[1]) {
        TtlStatus::Missing => -2,
        TtlStatus::NoExpiry => -1,
        // Round up so a fresh `EX 10` reports 10, as Redis does.
        TtlStatus::ExpiresIn(left) => left.as_millis().div_ceil(1000) as i64,
    };
    resp_integer(out, value);
}

fn resp_simple(out: &mut Vec<u8>, message: &str) {
    out.push(b'+');
    out.extend_from_slice(message.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn resp_error(out: &mut Vec<u8>, message: &str) {
    out.extend_from_slice(b"-ERR ");
    out.extend_from_slice(message.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn resp_integer(out: &mut Vec<u8>, value: i64) {
    out.push(b':');
    out.extend_from_slice(value.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn resp_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.push(b'$');
    out.extend_from_slice(data.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

fn resp_null(out: &mut Vec<u8>) {
    out.extend_from_slice(b"$-1\r\n");
}

/// Positive whole seconds; zero is rejected like Redis does.
fn parse_seconds(arg: &[u8]) -> Option<Duration> {
    match parse_u64(arg)? {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

fn parse_u64(arg: &[u8]) -> Option<u64> {
    if arg.is_empty() {
        return None;
    }
    arg.iter().try_fold(0u64, |value, &b| {
        if b.is_ascii_digit() {
            value.checked_mul(10)?.checked_add(u64::from(b - b'0'))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(args: &[&[u8]]) -> Vec<u8> {
        let mut buf = format!("*{}\r\n", args.len()).into_bytes();
        for arg in args {
            buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
            buf.extend_from_slice(arg);
            buf.extend_from_slice(b"\r\n");
        }
        buf
    }

    fn dispatch(state: &MockState, args: &[&[u8]]) -> Vec<u8> {
        let args: Vec<Vec<u8>> = args.iter().map(|arg| arg.to_vec()).collect();
        let mut out = Vec::new();
        dispatch_command(&args, state, &mut out);
        out
    }

    #[test]
    fn parses_pipelined_requests_and_waits_for_partial_ones() {
        let mut raw = request(&[b"PING"]);
        raw.extend_from_slice(&request(&[b"SET", b"k", b"v"]));
        let full = request(&[b"GET", b"k"]);
        raw.extend_from_slice(&full[..full.len() - 3]);
        let mut buffer = BytesMut::from(&raw[..]);

        assert_eq!(parse_request(&mut buffer).unwrap().unwrap(), vec![b"PING".to_vec()]);
        let set = parse_request(&mut buffer).unwrap().unwrap();
        assert_eq!(set[2], b"v");
        let before = buffer.len();
        assert!(parse_request(&mut buffer).unwrap().is_none());
        assert_eq!(buffer.len(), before);

        buffer.extend_from_slice(&full[full.len() - 3..]);
        assert_eq!(parse_request(&mut buffer).unwrap().unwrap()[0], b"GET");
        assert!(buffer.is_empty());
    }

    #[test]
    fn rejects_inline_commands() {
        let mut buffer = BytesMut::from(&b"PING\r\n"[..]);
        assert!(parse_request(&mut buffer).is_err());
    }

    #[test]
    fn oversized_counts_and_lengths_are_rejected() {
        for raw in [
            &b"*18446744073709551615\r\n"[..],
            &b"*1048577\r\n"[..],
            &b"*1\r\n$18446744073709551615\r\n"[..],
            &b"*1\r\n$536870913\r\n"[..],
            &b"*99999999999999999999999\r\n"[..],
        ] {
            let mut buffer = BytesMut::from(raw);
            assert!(parse_request(&mut buffer).is_err(), "{raw:?}");
        }

        // Within the limit a large announced argument just waits for bytes.
        let mut buffer = BytesMut::from(&b"*1\r\n$536870912\r\nabc"[..]);
        assert!(parse_request(&mut buffer).unwrap().is_none());
        assert_eq!(buffer.len(), 19);
    }

    #[test]
    fn malformed_header_gets_protocol_error_reply() {
        use std::io::{Read, Write};

        let server = MockServer::start().unwrap();
        let mut stream = std::net::TcpStream::connect(server.address()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        stream.write_all(b"*18446744073709551615\r\n").unwrap();

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).unwrap();
        assert_eq!(reply, b"-ERR protocol error\r\n");

        // The server keeps serving other clients.
        let mut next = std::net::TcpStream::connect(server.address()).unwrap();
        next.write_all(&request(&[b"PING"])).unwrap();
        let mut pong = [0u8; 7];
        next.read_exact(&mut pong).unwrap();
        assert_eq!(&pong, b"+PONG\r\n");
    }

    #[test]
    fn set_ex_then_get_and_ttl() {
        let state = MockState::default();
        assert_eq!(dispatch(&state, &[b"SET", b"k", b"v", b"EX", b"10"]), b"+OK\r\n");
        assert_eq!(dispatch(&state, &[b"GET", b"k"]), b"$1\r\nv\r\n");
        assert_eq!(dispatch(&state, &[b"TTL", b"k"]), b":10\r\n");
        assert_eq!(dispatch(&state, &[b"GET", b"nope"]), b"$-1\r\n");
        assert_eq!(dispatch(&state, &[b"TTL", b"nope"]), b":-2\r\n");
    }

    #[test]
    fn setex_takes_seconds_before_value() {
        let state = MockState::default();
        assert_eq!(dispatch(&state, &[b"SETEX", b"k", b"5", b"v"]), b"+OK\r\n");
        assert_eq!(dispatch(&state, &[b"GET", b"k"]), b"$1\r\nv\r\n");
        assert!(dispatch(&state, &[b"SETEX", b"k", b"v", b"5"]).starts_with(b"-ERR"));
    }

    #[test]
    fn zero_expiry_is_rejected() {
        let state = MockState::default();
        assert!(dispatch(&state, &[b"SET", b"k", b"v", b"EX", b"0"]).starts_with(b"-ERR"));
        assert!(state.store.is_empty());
    }

    #[test]
    fn fault_switches_change_replies() {
        let state = MockState::default();
        state.fail_pings.store(true, Ordering::SeqCst);
        assert!(dispatch(&state, &[b"PING"]).starts_with(b"-ERR"));

        state.poisoned.lock().insert(b"bad".to_vec());
        assert_eq!(dispatch(&state, &[b"SET", b"bad", b"v"]), b"-ERR poisoned key\r\n");
        assert_eq!(dispatch(&state, &[b"SET", b"good", b"v"]), b"+OK\r\n");
    }

    #[test]
    fn del_and_expire_count_live_keys() {
        let state = MockState::default();
        dispatch(&state, &[b"SET", b"a", b"1"]);
        assert_eq!(dispatch(&state, &[b"EXPIRE", b"a", b"30"]), b":1\r\n");
        assert_eq!(dispatch(&state, &[b"EXPIRE", b"b", b"30"]), b":0\r\n");
        assert_eq!(dispatch(&state, &[b"DEL", b"a", b"b"]), b":1\r\n");
    }

    #[test]
    fn server_answers_over_tcp_and_stops_on_drop() {
        use std::io::{Read, Write};

        let server = MockServer::start().unwrap();
        let addr = server.socket_addr().unwrap();
        let mut stream = std::net::TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let mut raw = request(&[b"PING"]);
        raw.extend_from_slice(&request(&[b"SET", b"k", b"v"]));
        stream.write_all(&raw).unwrap();

        let expected = b"+PONG\r\n+OK\r\n";
        let mut reply = vec![0u8; expected.len()];
        stream.read_exact(&mut reply).unwrap();
        assert_eq!(reply, expected);
        assert_eq!(server.accepted(), 1);
        assert_eq!(server.commands(), 2);
        assert_eq!(server.store().get(b"k").as_deref(), Some(&b"v"[..]));

        drop(server);
        assert!(std::net::TcpStream::connect(addr).is_err());
    }

    #[test]
    fn drop_connections_closes_accepted_sockets() {
        use std::io::Read;

        let server = MockServer::start().unwrap();
        server.set_drop_connections(true);
        let mut stream = std::net::TcpStream::connect(server.address()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let mut buf = [0u8; 1];
        assert_eq!(stream.read(&mut buf).unwrap_or(0), 0);
        assert_eq!(server.accepted(), 1);
    }
}
