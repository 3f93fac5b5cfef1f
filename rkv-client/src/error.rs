//! # Error Taxonomy
//!
//! Purpose: Tag every failure the client can surface with one kind so callers
//! can decide between failing a request, retrying, or falling back.
//!
//! ## Design Principles
//! 1. **Classify Once**: Transport and protocol failures are retry-safe, a
//!    server rejection is not, and the distinction lives here.
//! 2. **No Raw Leaks**: IO errors are wrapped, never handed out bare.
//! 3. **Server Errors Are Replies**: `ServerError` travels inside a `Reply`;
//!    it only becomes a `ClientError` when a wrapper asks for a typed value.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Dial, write, read or timeout failure. Kills the connection.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    /// Bytes on the wire could not be framed as a reply. Kills the connection.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The server rejected the command.
    #[error("server error: {0}")]
    Server(ServerError),
    /// Reply variant did not match what the command wrapper expected.
    #[error("unexpected reply type: expected {expected}, got {actual}")]
    UnexpectedType {
        expected: &'static str,
        actual: &'static str,
    },
    /// No connection became available within the wait timeout.
    #[error("connection pool exhausted for {addr}")]
    PoolExhausted { addr: String },
    /// The pool has been torn down.
    #[error("connection pool closed")]
    PoolClosed,
    /// Address is not part of the configured backend list.
    #[error("unknown backend address: {0}")]
    UnknownAddress(String),
    /// Every attempt failed with a transport or protocol error.
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        last: Box<ClientError>,
    },
    /// Configuration was rejected during validation or loading.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Flat view of [`ClientError`] for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Server,
    UnexpectedType,
    PoolExhausted,
    PoolClosed,
    UnknownAddress,
    RetriesExhausted,
    Config,
}

impl ClientError {
    /// Returns the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(_) => ErrorKind::Transport,
            ClientError::Protocol(_) => ErrorKind::Protocol,
            ClientError::Server(_) => ErrorKind::Server,
            ClientError::UnexpectedType { .. } => ErrorKind::UnexpectedType,
            ClientError::PoolExhausted { .. } => ErrorKind::PoolExhausted,
            ClientError::PoolClosed => ErrorKind::PoolClosed,
            ClientError::UnknownAddress(_) => ErrorKind::UnknownAddress,
            ClientError::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            ClientError::Config(_) => ErrorKind::Config,
        }
    }

    /// True when resubmitting on a fresh connection may succeed.
    ///
    /// Only broken streams qualify; a server rejection would repeat
    /// deterministically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Protocol(_))
    }

    pub(crate) fn not_connected() -> Self {
        ClientError::Transport(io::Error::new(
            io::ErrorKind::NotConnected,
            "connection is not ready",
        ))
    }
}

impl From<ServerError> for ClientError {
    fn from(err: ServerError) -> Self {
        ClientError::Server(err)
    }
}

/// Malformed framing detected while decoding a reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown reply tag byte 0x{0:02x}")]
    UnknownTag(u8),
    #[error("invalid length {0}")]
    InvalidLength(i64),
    #[error("invalid integer")]
    InvalidInteger,
    #[error("missing CRLF terminator")]
    MissingCrlf,
    #[error("stream ended mid-frame")]
    Truncated,
    #[error("reply nesting deeper than {0}")]
    TooDeep(usize),
}

/// Error reply sent by the server: `-<CODE> <message>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerError {
    code: String,
    message: String,
}

impl ServerError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerError {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Splits an error line at the first space into code and message.
    pub fn parse(line: &[u8]) -> Self {
        let text = String::from_utf8_lossy(line);
        match text.split_once(' ') {
            Some((code, message)) => ServerError::new(code, message),
            None => ServerError::new(text, String::new()),
        }
    }

    /// Error code, e.g. `ERR` or `WRONGTYPE`.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.message)
        }
    }
}

impl std::error::Error for ServerError {}
