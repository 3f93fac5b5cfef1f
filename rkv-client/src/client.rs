//! # Synchronous Client API
//!
//! Purpose: Expose a compact, blocking API for issuing commands to the
//! backend over the RESP wire protocol.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KvClient` hides pooling, retry and framing.
//! 2. **Borrow-Friendly API**: Accept `&[u8]` to avoid unnecessary copies.
//! 3. **Generic Core**: Typed commands are thin shims over `execute`; any
//!    other command goes through `execute` directly.

use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::invoker::Invoker;
use crate::metrics::PoolStats;
use crate::pool::Pool;
use crate::resp::{Command, Reply};

/// TTL state returned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientTtl {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

/// Options for `SCAN`.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions<'a> {
    /// `MATCH` glob pattern.
    pub pattern: Option<&'a [u8]>,
    /// `COUNT` hint.
    pub count: Option<u64>,
}

/// Synchronous client with connection pooling.
///
/// Each call acquires a connection for the default address (the first
/// configured one), executes one command, and returns the connection.
#[derive(Debug, Clone)]
pub struct KvClient {
    invoker: Invoker,
    default_addr: String,
}

impl KvClient {
    /// Creates a client with default configuration for one address.
    pub fn connect(addr: impl Into<String>) -> ClientResult<Self> {
        Self::with_config(ClientConfig::for_address(addr))
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let pool = Pool::new(config)?;
        Self::with_pool(pool)
    }

    /// Creates a client over an existing pool.
    pub fn with_pool(pool: Pool) -> ClientResult<Self> {
        let default_addr = pool.config().default_address()?.to_string();
        Ok(KvClient {
            invoker: Invoker::new(pool),
            default_addr,
        })
    }

    /// Runs any command against the default address.
    pub fn execute(&self, command: &Command) -> ClientResult<Reply> {
        self.invoker.execute(&self.default_addr, command)
    }

    /// Runs any command against a specific configured address.
    pub fn execute_on(&self, addr: &str, command: &Command) -> ClientResult<Reply> {
        self.invoker.execute(addr, command)
    }

    pub fn stats(&self) -> PoolStats {
        self.invoker.pool().stats()
    }

    /// Tears down the pool; later calls fail with `PoolClosed`.
    pub fn close(&self) {
        self.invoker.pool().close();
    }

    /// Pings the server. Returns the raw reply payload.
    pub fn ping(&self, payload: Option<&[u8]>) -> ClientResult<Vec<u8>> {
        let command = match payload {
            Some(data) => Command::new("PING").arg(data),
            None => Command::new("PING"),
        };
        match self.execute(&command)?.into_result()? {
            Reply::Status(text) => Ok(text),
            Reply::Bulk(Some(data)) => Ok(data),
            other => Err(ClientError::UnexpectedType {
                expected: "status",
                actual: other.type_name(),
            }),
        }
    }

    /// Fetches server INFO output.
    pub fn info(&self) -> ClientResult<Vec<u8>> {
        self.execute(&Command::new("INFO"))?
            .into_bulk()?
            .ok_or(ClientError::UnexpectedType {
                expected: "bulk",
                actual: "null bulk",
            })
    }

    /// Fetches a value by key.
    ///
    /// Returns `Ok(None)` when the key is missing.
    pub fn get(&self, key: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        self.execute(&Command::new("GET").arg(key))?.into_bulk()
    }

    /// Sets a value for a key without expiration.
    pub fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        self.execute(&Command::new("SET").arg(key).arg(value))?
            .into_status()
            .map(|_| ())
    }

    /// Sets a value and attaches an expiration in seconds.
    pub fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> ClientResult<()> {
        let command = Command::new("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs());
        self.execute(&command)?.into_status().map(|_| ())
    }

    /// Deletes a key. Returns true when a key was removed.
    pub fn delete(&self, key: &[u8]) -> ClientResult<bool> {
        Ok(self.execute(&Command::new("DEL").arg(key))?.into_integer()? > 0)
    }

    pub fn exists(&self, key: &[u8]) -> ClientResult<bool> {
        Ok(self.execute(&Command::new("EXISTS").arg(key))?.into_integer()? == 1)
    }

    /// Sets a time-to-live on a key. Returns true when the TTL was set.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> ClientResult<bool> {
        let command = Command::new("EXPIRE").arg(key).arg(ttl.as_secs());
        Ok(self.execute(&command)?.into_integer()? == 1)
    }

    /// Returns TTL status for a key.
    pub fn ttl(&self, key: &[u8]) -> ClientResult<ClientTtl> {
        match self.execute(&Command::new("TTL").arg(key))?.into_integer()? {
            -2 => Ok(ClientTtl::Missing),
            -1 => Ok(ClientTtl::NoExpiry),
            value if value >= 0 => Ok(ClientTtl::ExpiresIn(Duration::from_secs(value as u64))),
            _ => Err(ClientError::UnexpectedType {
                expected: "ttl",
                actual: "negative integer",
            }),
        }
    }

    /// Runs one `SCAN` step. Returns the next cursor and the keys found;
    /// a returned cursor of 0 ends the iteration.
    pub fn scan(&self, cursor: u64, options: &ScanOptions<'_>) -> ClientResult<(u64, Vec<Vec<u8>>)> {
        let mut command = Command::new("SCAN").arg(cursor);
        if let Some(pattern) = options.pattern {
            command = command.arg("MATCH").arg(pattern);
        }
        if let Some(count) = options.count {
            command = command.arg("COUNT").arg(count);
        }

        let items = self
            .execute(&command)?
            .into_array()?
            .ok_or(ClientError::UnexpectedType {
                expected: "array",
                actual: "null array",
            })?;
        let mut items = items.into_iter();
        let (cursor, keys) = match (items.next(), items.next(), items.next()) {
            (Some(cursor), Some(keys), None) => (cursor, keys),
            _ => {
                return Err(ClientError::UnexpectedType {
                    expected: "[cursor, keys]",
                    actual: "array",
                })
            }
        };

        let cursor = cursor.into_bulk()?.unwrap_or_default();
        let cursor = std::str::from_utf8(&cursor)
            .ok()
            .and_then(|text| text.parse::<u64>().ok())
            .ok_or(ClientError::UnexpectedType {
                expected: "numeric cursor",
                actual: "bulk",
            })?;

        let keys = keys
            .into_array()?
            .unwrap_or_default()
            .into_iter()
            .map(|key| key.into_bulk().map(Option::unwrap_or_default))
            .collect::<ClientResult<Vec<_>>>()?;
        Ok((cursor, keys))
    }
}
