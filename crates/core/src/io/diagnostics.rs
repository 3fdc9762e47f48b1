//! Bounded rolling log feeding the front end's diagnostic pane.
//!
//! [`DiagnosticLog`] implements [`MakeWriter`], so a `tracing_subscriber::fmt`
//! layer can write into it directly. Only the most recent `capacity` lines are
//! kept.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::fmt::MakeWriter;

struct Ring {
    lines: VecDeque<String>,
    capacity: usize,
}

/// Shared ring buffer of log lines. Clones share the same buffer.
#[derive(Clone)]
pub struct DiagnosticLog {
    inner: Arc<Mutex<Ring>>,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Ring {
                lines: VecDeque::with_capacity(capacity),
                capacity,
            })),
        }
    }

    fn ring(&self) -> MutexGuard<'_, Ring> {
        // a panic mid-push leaves the ring usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut ring = self.ring();
        if ring.lines.len() >= ring.capacity {
            ring.lines.pop_front();
        }
        ring.lines.push_back(line.into());
    }

    /// The most recent `n` lines (or all if fewer), oldest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let ring = self.ring();
        let start = ring.lines.len().saturating_sub(n);
        ring.lines.range(start..).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ring().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring().lines.is_empty()
    }
}

impl std::fmt::Debug for DiagnosticLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticLog").field("len", &self.len()).finish()
    }
}

/// Per-event writer handed out to the fmt layer.
pub struct LogWriter {
    log: DiagnosticLog,
    partial: Vec<u8>,
}

impl LogWriter {
    fn emit(&mut self) {
        let raw = std::mem::take(&mut self.partial);
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches('\r');
        if !line.is_empty() {
            self.log.push(line);
        }
    }
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            if byte == b'\n' {
                self.emit();
            } else {
                self.partial.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if !self.partial.is_empty() {
            self.emit();
        }
    }
}

impl<'a> MakeWriter<'a> for DiagnosticLog {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            log: self.clone(),
            partial: Vec::new(),
        }
    }
}
