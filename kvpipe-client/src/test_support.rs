//! In-memory dialer and connections for unit tests.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use kvpipe_common::{HostConfig, KvError, KvResult};

use crate::connection::{Dialer, RawConnection};
use crate::resp::RespValue;

/// Shared switches and counters behind every `FakeConnection`.
#[derive(Default)]
pub struct FakeBackend {
    pub dials: AtomicUsize,
    pub flushes: AtomicUsize,
    pub closes: AtomicUsize,
    pub pings: AtomicUsize,
    refuse_dials: AtomicBool,
    broken: AtomicBool,
    poisoned: Mutex<HashSet<Vec<u8>>>,
}

#[derive(Clone, Default)]
pub struct FakeDialer {
    pub backend: Arc<FakeBackend>,
}

impl FakeDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dials(&self) -> usize {
        self.backend.dials.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.backend.flushes.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.backend.pings.load(Ordering::SeqCst)
    }

    /// Dials fail with connection refused.
    pub fn set_refusing(&self, refusing: bool) {
        self.backend.refuse_dials.store(refusing, Ordering::SeqCst);
    }

    /// Established connections fail every flush and receive.
    pub fn set_broken(&self, broken: bool) {
        self.backend.broken.store(broken, Ordering::SeqCst);
    }

    /// Writes to `key` get an error reply.
    pub fn poison(&self, key: &[u8]) {
        self.backend.poisoned.lock().insert(key.to_vec());
    }
}

impl Dialer for FakeDialer {
    fn dial(&self, config: &HostConfig) -> KvResult<Box<dyn RawConnection>> {
        self.backend.dials.fetch_add(1, Ordering::SeqCst);
        if self.backend.refuse_dials.load(Ordering::SeqCst) {
            return Err(KvError::Dial {
                address: config.address.clone(),
                source: io::ErrorKind::ConnectionRefused.into(),
            });
        }
        Ok(Box::new(FakeConnection {
            backend: Arc::clone(&self.backend),
            queued: Vec::new(),
            replies: VecDeque::new(),
            closed: false,
        }))
    }
}

/// Answers PING and SET the way a healthy store would.
pub struct FakeConnection {
    backend: Arc<FakeBackend>,
    queued: Vec<Vec<Vec<u8>>>,
    replies: VecDeque<RespValue>,
    closed: bool,
}

impl FakeConnection {
    fn check(&self) -> KvResult<()> {
        if self.closed {
            return Err(io::Error::from(io::ErrorKind::NotConnected).into());
        }
        if self.backend.broken.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
        }
        Ok(())
    }

    fn respond(&self, command: &[Vec<u8>]) -> RespValue {
        match command.first().map(Vec::as_slice) {
            Some(b"PING") => {
                self.backend.pings.fetch_add(1, Ordering::SeqCst);
                RespValue::Simple(b"PONG".to_vec())
            }
            Some(b"SET") => {
                let key = command.get(1).cloned().unwrap_or_default();
                if self.backend.poisoned.lock().contains(&key) {
                    RespValue::Error(b"ERR poisoned key".to_vec())
                } else {
                    RespValue::Simple(b"OK".to_vec())
                }
            }
            _ => RespValue::Error(b"ERR unknown command".to_vec()),
        }
    }
}

impl RawConnection for FakeConnection {
    fn send(&mut self, args: &[&[u8]]) -> KvResult<()> {
        if self.closed {
            return Err(io::Error::from(io::ErrorKind::NotConnected).into());
        }
        self.queued.push(args.iter().map(|arg| arg.to_vec()).collect());
        Ok(())
    }

    fn flush(&mut self) -> KvResult<()> {
        self.backend.flushes.fetch_add(1, Ordering::SeqCst);
        let queued = std::mem::take(&mut self.queued);
        self.check()?;
        for command in queued {
            let reply = self.respond(&command);
            self.replies.push_back(reply);
        }
        Ok(())
    }

    fn receive(&mut self) -> KvResult<RespValue> {
        self.check()?;
        self.replies
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof).into())
    }

    fn close(&mut self) -> KvResult<()> {
        if !self.closed {
            self.closed = true;
            self.backend.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Connection that replays a fixed list of replies, one per `receive`.
#[derive(Default)]
pub struct ScriptedConnection {
    pub sent: Vec<Vec<Vec<u8>>>,
    pub flushes: usize,
    pub replies: VecDeque<KvResult<RespValue>>,
    pub fail_flush: bool,
}

impl ScriptedConnection {
    pub fn with_replies(replies: Vec<KvResult<RespValue>>) -> Self {
        ScriptedConnection {
            replies: replies.into(),
            ..Self::default()
        }
    }
}

impl RawConnection for ScriptedConnection {
    fn send(&mut self, args: &[&[u8]]) -> KvResult<()> {
        self.sent.push(args.iter().map(|arg| arg.to_vec()).collect());
        Ok(())
    }

    fn flush(&mut self) -> KvResult<()> {
        self.flushes += 1;
        if self.fail_flush {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
        }
        Ok(())
    }

    fn receive(&mut self) -> KvResult<RespValue> {
        self.replies
            .pop_front()
            .unwrap_or_else(|| Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()))
    }

    fn close(&mut self) -> KvResult<()> {
        Ok(())
    }
}
