// src/system/sinks.rs

//! Destinations for captured task output.
//!
//! Lines are written verbatim: no framing, no prefixes. A failing sink is reported with
//! `log::warn!` and skipped so it never interrupts the task that is writing to it.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// A set of writable text streams that receive every captured line.
#[derive(Default)]
pub struct OutputSinks {
    sinks: Vec<Box<dyn Write + Send>>,
}

impl fmt::Debug for OutputSinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSinks")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl OutputSinks {
    /// An empty set. Output is still captured in memory by the runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// A set containing only the process's standard output.
    pub fn stdout() -> Self {
        let mut sinks = Self::new();
        sinks.push(io::stdout());
        sinks
    }

    /// Adds a sink.
    pub fn push(&mut self, sink: impl Write + Send + 'static) -> &mut Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Number of sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Writes `text` exactly as given to every sink.
    pub fn write_raw(&mut self, text: &str) {
        for (i, sink) in self.sinks.iter_mut().enumerate() {
            if let Err(e) = sink.write_all(text.as_bytes()) {
                log::warn!("Failed to write to output sink #{}: {}", i, e);
            }
        }
    }

    /// Writes `text` followed by a newline to every sink.
    pub fn println(&mut self, text: &str) {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        self.write_raw(&line);
    }

    /// Flushes every sink.
    pub fn flush(&mut self) {
        for (i, sink) in self.sinks.iter_mut().enumerate() {
            if let Err(e) = sink.flush() {
                log::warn!("Failed to flush output sink #{}: {}", i, e);
            }
        }
    }
}

/// An in-memory sink whose clones share one buffer.
///
/// Useful to keep a copy of a sweep's raw output, and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .buffer
            .lock()
            .map_err(|_| io::Error::other("memory sink lock poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
