//! # Single Connection
//!
//! Purpose: Run one command at a time over one transport stream and track
//! whether the stream can still be trusted.
//!
//! ## Design Principles
//! 1. **Strict Request/Response**: `&mut self` plus the `Busy` state keep a
//!    single command in flight; there is no implicit pipelining.
//! 2. **One-Way Death**: Any IO or framing failure moves the connection to
//!    `Dead`. A timed-out read may have consumed part of the next reply, so a
//!    dead connection is never reused.
//! 3. **Buffer Reuse**: Each connection keeps its own read and write buffers.
//! 4. **Pluggable Transport**: `Connector` produces the stream, so tests can
//!    swap TCP for a scripted double.

use std::fmt;
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::resp::{encode_command, read_reply, Command, Reply};

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Byte stream a connection runs on.
pub trait Stream: Read + Write + Send {
    /// Applies a read and write timeout; `None` blocks indefinitely.
    fn set_io_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Releases the underlying transport.
    fn shutdown(&self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for TcpStream {
    fn set_io_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Dials streams to backend addresses.
pub trait Connector: Send + Sync {
    fn connect(&self, addr: &str, timeout: Duration) -> io::Result<Box<dyn Stream>>;
}

/// Default connector dialing plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, addr: &str, timeout: Duration) -> io::Result<Box<dyn Stream>> {
        let mut last_err = None;
        for socket_addr in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&socket_addr, timeout) {
                Ok(stream) => {
                    // Disable Nagle to keep request latency low for small payloads.
                    stream.set_nodelay(true)?;
                    return Ok(Box::new(stream));
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("{} did not resolve", addr))
        }))
    }
}

/// Lifecycle of a connection.
///
/// `Disconnected → Connecting → Ready → (Busy ⇄ Ready) → Dead`
///
/// The first two states only exist inside [`Connection::open`], which
/// returns either a `Ready` connection or an error, so callers never
/// observe them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Ready,
    Busy,
    Dead,
}

/// One transport endpoint to one backend address.
pub struct Connection {
    id: u64,
    addr: String,
    state: ConnState,
    io_timeout: Option<Duration>,
    last_used: Instant,
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: Option<BufReader<Box<dyn Stream>>>,
    line_buf: Vec<u8>,
    write_buf: BytesMut,
}

impl Connection {
    /// Dials `addr` and returns a `Ready` connection.
    ///
    /// A failed dial returns the error and no connection, so a value of this
    /// type is never `Disconnected` or `Connecting`.
    pub fn open(
        connector: &dyn Connector,
        addr: &str,
        dial_timeout: Duration,
        io_timeout: Option<Duration>,
    ) -> ClientResult<Self> {
        let stream = connector.connect(addr, dial_timeout).map_err(|err| {
            debug!(addr = %addr, error = %err, "dial failed");
            ClientError::Transport(err)
        })?;
        stream.set_io_timeout(io_timeout)?;

        let conn = Connection {
            id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            addr: addr.to_string(),
            state: ConnState::Ready,
            io_timeout,
            last_used: Instant::now(),
            reader: Some(BufReader::new(stream)),
            line_buf: Vec::with_capacity(128),
            write_buf: BytesMut::with_capacity(256),
        };
        debug!(addr = %addr, conn_id = conn.id, "connection opened");
        Ok(conn)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnState::Ready
    }

    /// Time since the last completed exchange (or since the dial).
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Sends one command and reads exactly one reply.
    ///
    /// An error reply from the server is a successful exchange and leaves the
    /// connection `Ready`. Any IO or framing failure leaves it `Dead`.
    pub fn exec(&mut self, command: &Command) -> ClientResult<Reply> {
        if self.state != ConnState::Ready {
            return Err(ClientError::not_connected());
        }
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Err(ClientError::not_connected()),
        };

        self.state = ConnState::Busy;
        self.write_buf.clear();
        encode_command(command, &mut self.write_buf);

        let result = write_frame(reader.get_mut(), &self.write_buf)
            .and_then(|()| read_reply(reader, &mut self.line_buf));

        match result {
            Ok(reply) => {
                self.state = ConnState::Ready;
                self.last_used = Instant::now();
                Ok(reply)
            }
            Err(err) => {
                warn!(addr = %self.addr, conn_id = self.id, error = %err, "connection failed");
                self.mark_dead();
                Err(err)
            }
        }
    }

    /// Round-trips a `PING` bounded by `timeout`.
    ///
    /// Anything other than `+PONG` marks the connection `Dead`. This never
    /// goes through the retrying call path.
    pub fn check_alive(&mut self, timeout: Duration) -> bool {
        if self.state != ConnState::Ready {
            return false;
        }
        if self.apply_timeout(Some(timeout)).is_err() {
            self.mark_dead();
            return false;
        }

        let alive = match self.exec(&Command::new("PING")) {
            Ok(Reply::Status(text)) => text == b"PONG",
            Ok(other) => {
                debug!(conn_id = self.id, reply = other.type_name(), "unexpected liveness reply");
                false
            }
            Err(_) => false,
        };

        if alive && self.apply_timeout(self.io_timeout).is_ok() {
            return true;
        }
        warn!(addr = %self.addr, conn_id = self.id, "liveness check failed");
        self.mark_dead();
        false
    }

    /// Releases the transport. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.get_ref().shutdown();
            debug!(addr = %self.addr, conn_id = self.id, "connection closed");
        }
        self.state = ConnState::Dead;
    }

    fn apply_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self.reader.as_ref() {
            Some(reader) => reader.get_ref().set_io_timeout(timeout),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "no stream")),
        }
    }

    fn mark_dead(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_frame(stream: &mut Box<dyn Stream>, frame: &[u8]) -> ClientResult<()> {
    // write_all reports a short write as WriteZero.
    stream.write_all(frame)?;
    stream.flush()?;
    Ok(())
}
