//! # Command Invoker
//!
//! Purpose: Turn "run this command against that address" into a reply,
//! hiding connection acquisition and transient-failure retry from callers.
//!
//! ## Design Principles
//! 1. **Retry Only Broken Streams**: Transport and protocol failures are
//!    resubmitted on a fresh connection. A server error reply is an answer,
//!    and resubmitting it would repeat the same failure.
//! 2. **Acquisition Is Not Retried**: The pool already waited or dialed; its
//!    error goes straight back to the caller.
//! 3. **Injected Policy**: The attempt bound comes from configuration.

use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::pool::Pool;
use crate::resp::{Command, Reply};

/// Executes commands through a pool with bounded retry.
#[derive(Debug, Clone)]
pub struct Invoker {
    pool: Pool,
    max_attempts: usize,
}

impl Invoker {
    /// Uses `max_attempts` from the pool's configuration.
    pub fn new(pool: Pool) -> Self {
        let max_attempts = pool.config().max_attempts;
        Self::with_max_attempts(pool, max_attempts)
    }

    /// Overrides the attempt bound; values below 1 are treated as 1.
    pub fn with_max_attempts(pool: Pool, max_attempts: usize) -> Self {
        Invoker {
            pool,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Runs `command` against `addr` and returns the server's reply.
    ///
    /// An error reply (`Reply::Error`) is returned as `Ok`. After
    /// `max_attempts` broken connections the last failure comes back wrapped
    /// in `ClientError::RetriesExhausted`.
    pub fn execute(&self, addr: &str, command: &Command) -> ClientResult<Reply> {
        let mut last_err = None;

        for attempt in 1..=self.max_attempts {
            let mut conn = self.pool.acquire(addr)?;

            match conn.exec(command) {
                Ok(reply) => {
                    conn.release(true);
                    return Ok(reply);
                }
                Err(err) if err.is_retryable() => {
                    conn.release(false);
                    warn!(
                        addr = %addr,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "command failed on a broken connection"
                    );
                    last_err = Some(err);
                }
                Err(err) => {
                    let healthy = conn.is_ready();
                    conn.release(healthy);
                    return Err(err);
                }
            }
        }

        let last = last_err.unwrap_or_else(ClientError::not_connected);
        debug!(addr = %addr, attempts = self.max_attempts, "retries exhausted");
        Err(ClientError::RetriesExhausted {
            attempts: self.max_attempts,
            last: Box::new(last),
        })
    }
}
