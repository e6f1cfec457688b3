//! Test doubles for the engine's collaborators
//!
//! Used by the unit tests here and by the integration tests in `tests/`.
//! A `SimChannel` stands in for an instrument: feed it incoming bytes,
//! inspect what was written, or configure a canned reply per sent line.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::common::Result;
use crate::engine::{LogSink, Operator};
use crate::transport::RawChannel;

/// A simulated byte channel with shared interior state
///
/// Clones share the same state, so a test can keep a handle while the
/// transport owns the boxed channel.
#[derive(Clone, Default)]
pub struct SimChannel {
    inner: Arc<Mutex<SimInner>>,
}

struct SimInner {
    incoming: VecDeque<u8>,
    written: Arc<Mutex<Vec<u8>>>,
    /// If set, queued as a reply every time a full line is written
    auto_reply: Option<String>,
    open: bool,
    drop_writes: bool,
}

impl Default for SimInner {
    fn default() -> Self {
        Self {
            incoming: VecDeque::new(),
            written: Arc::new(Mutex::new(Vec::new())),
            auto_reply: None,
            open: true,
            drop_writes: false,
        }
    }
}

impl SimChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes the channel will hand to the next reads
    pub fn enqueue(&self, text: &str) {
        self.inner
            .lock()
            .unwrap()
            .incoming
            .extend(text.as_bytes());
    }

    /// Reply with `text` (plus CRLF) every time a full line is written
    pub fn reply_with(&self, text: &str) {
        self.inner.lock().unwrap().auto_reply = Some(text.to_string());
    }

    /// Shared handle to everything written so far
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        self.inner.lock().unwrap().written.clone()
    }

    /// Everything written so far, as text
    pub fn written_text(&self) -> String {
        let written = self.written();
        let bytes = written.lock().unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Simulate the channel going away
    pub fn close(&self) {
        self.inner.lock().unwrap().open = false;
    }

    /// Accept writes but report zero bytes written
    pub fn drop_writes(&self) {
        self.inner.lock().unwrap().drop_writes = true;
    }
}

impl RawChannel for SimChannel {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.open {
            return Ok(0);
        }
        let mut n = 0;
        while n < buf.len() {
            match inner.incoming.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if inner.drop_writes {
            return Ok(0);
        }
        inner.written.lock().unwrap().extend_from_slice(bytes);
        for &byte in bytes {
            if byte == b'\n' {
                if let Some(reply) = inner.auto_reply.clone() {
                    inner.incoming.extend(reply.as_bytes());
                    inner.incoming.extend(b"\r\n");
                }
            }
        }
        Ok(bytes.len())
    }

    fn clear_input(&mut self) -> Result<()> {
        self.inner.lock().unwrap().incoming.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.inner.lock().unwrap().open
    }
}

/// Log line classification used by [`CollectingSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Black,
    Gray,
    Red,
}

/// A log sink that records everything for later assertions
#[derive(Clone, Default)]
pub struct CollectingSink {
    lines: Arc<Mutex<Vec<(Severity, String)>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded lines in order
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Only the failure lines
    pub fn reds(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(severity, _)| *severity == Severity::Red)
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Whether any recorded line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(_, line)| line.contains(needle))
    }
}

impl LogSink for CollectingSink {
    fn black(&self, line: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((Severity::Black, line.to_string()));
    }

    fn gray(&self, line: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((Severity::Gray, line.to_string()));
    }

    fn red(&self, line: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((Severity::Red, line.to_string()));
    }
}

/// An operator that answers prompts from a prepared list
///
/// Runs out of answers -> answers yes. Every prompt and notification is
/// recorded.
#[derive(Default)]
pub struct ScriptedOperator {
    answers: Mutex<VecDeque<bool>>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedOperator {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the prompts and notifications shown so far
    pub fn seen(&self) -> Arc<Mutex<Vec<String>>> {
        self.seen.clone()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn ask_yes_no(&self, text: &str) -> Result<bool> {
        self.seen.lock().unwrap().push(text.to_string());
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(true))
    }

    async fn notify(&self, text: &str) -> Result<()> {
        self.seen.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
