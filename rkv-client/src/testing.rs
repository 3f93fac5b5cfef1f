//! Scripted transport doubles for unit tests.

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::connection::{Connector, Stream};

#[derive(Debug, Clone)]
enum Behavior {
    Replies(Vec<u8>),
    FailRead,
    FailWrite,
    Refuse,
}

/// What the next dialed stream does.
#[derive(Debug, Clone)]
pub(crate) struct Script {
    behavior: Behavior,
    delay: Duration,
}

impl Script {
    /// Serves `bytes` as the reply stream.
    pub(crate) fn replies(bytes: &[u8]) -> Self {
        Script {
            behavior: Behavior::Replies(bytes.to_vec()),
            delay: Duration::ZERO,
        }
    }

    /// Every read times out.
    pub(crate) fn fail_read() -> Self {
        Script {
            behavior: Behavior::FailRead,
            delay: Duration::ZERO,
        }
    }

    /// Every write breaks the pipe.
    pub(crate) fn fail_write() -> Self {
        Script {
            behavior: Behavior::FailWrite,
            delay: Duration::ZERO,
        }
    }

    /// The dial itself is refused.
    pub(crate) fn refuse() -> Self {
        Script {
            behavior: Behavior::Refuse,
            delay: Duration::ZERO,
        }
    }

    /// Sleeps before each read to keep the command in flight.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct Shared {
    scripts: Mutex<VecDeque<Script>>,
    written: Mutex<Vec<Arc<Mutex<Vec<u8>>>>>,
    dials: AtomicUsize,
    open: AtomicUsize,
    peak: AtomicUsize,
}

/// Connector handing out one scripted stream per dial, in order.
///
/// Dials past the end of the script are refused.
#[derive(Clone, Default)]
pub(crate) struct ScriptedConnector {
    shared: Arc<Shared>,
}

impl ScriptedConnector {
    pub(crate) fn new(scripts: Vec<Script>) -> Self {
        let connector = ScriptedConnector::default();
        connector.shared.scripts.lock().extend(scripts);
        connector
    }

    pub(crate) fn dials(&self) -> usize {
        self.shared.dials.load(Ordering::SeqCst)
    }

    pub(crate) fn open_streams(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Highest number of streams open at the same time.
    pub(crate) fn peak_streams(&self) -> usize {
        self.shared.peak.load(Ordering::SeqCst)
    }

    /// Bytes written to the `index`-th dialed stream.
    pub(crate) fn written(&self, index: usize) -> Vec<u8> {
        self.shared.written.lock()[index].lock().clone()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, addr: &str, _timeout: Duration) -> io::Result<Box<dyn Stream>> {
        self.shared.dials.fetch_add(1, Ordering::SeqCst);
        let script = self.shared.scripts.lock().pop_front();
        let script = match script {
            Some(script) if !matches!(script.behavior, Behavior::Refuse) => script,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("{} refused", addr),
                ))
            }
        };

        let written = Arc::new(Mutex::new(Vec::new()));
        self.shared.written.lock().push(written.clone());
        let open = self.shared.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.peak.fetch_max(open, Ordering::SeqCst);

        let input = match &script.behavior {
            Behavior::Replies(bytes) => bytes.clone(),
            _ => Vec::new(),
        };
        Ok(Box::new(ScriptedStream {
            input: Cursor::new(input),
            behavior: script.behavior,
            delay: script.delay,
            written,
            shared: self.shared.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct ScriptedStream {
    input: Cursor<Vec<u8>>,
    behavior: Behavior,
    delay: Duration,
    written: Arc<Mutex<Vec<u8>>>,
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl ScriptedStream {
    fn release(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        match self.behavior {
            Behavior::FailRead => Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
            _ => self.input.read(buf),
        }
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.behavior {
            Behavior::FailWrite => Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")),
            _ => {
                self.written.lock().extend_from_slice(buf);
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for ScriptedStream {
    fn set_io_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> io::Result<()> {
        self.release();
        Ok(())
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.release();
    }
}
