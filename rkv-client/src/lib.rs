//! # RESP Client Core
//!
//! Purpose: Provide a synchronous client for RESP key-value servers: the
//! reply codec, a single-connection execution engine, bounded retry, and a
//! per-address connection pool.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections to avoid repeated connects.
//! 2. **Classified Failures**: Transport, protocol and server outcomes are
//!    distinct so only broken streams are retried.
//! 3. **Minimal Allocation**: Reuse buffers for RESP framing and parsing.
//! 4. **Protocol Clarity**: Encode/parse RESP explicitly for correctness.
//!
//! ## Data Flow
//!
//! ```text
//! KvClient / caller
//!   └── Invoker::execute(addr, command)
//!         ├── Pool::acquire(addr) ──► Connection (Ready)
//!         ├── Connection::exec ──► encode_command ──► socket
//!         │                    ◄── read_reply     ◄── socket
//!         └── PooledConnection::release(healthy)
//! ```

mod client;
mod config;
mod connection;
mod error;
mod invoker;
mod metrics;
mod pool;
pub mod resp;

#[cfg(test)]
mod testing;

pub use client::{ClientTtl, KvClient, ScanOptions};
pub use config::ClientConfig;
pub use connection::{ConnState, Connection, Connector, Stream, TcpConnector};
pub use error::{ClientError, ClientResult, ErrorKind, ProtocolError, ServerError};
pub use invoker::Invoker;
pub use metrics::PoolStats;
pub use pool::{Pool, PooledConnection};
pub use resp::{Arg, Command, Reply};
