//! Line framing over a raw byte channel
//!
//! Writes are paced one byte at a time because the instrument drops
//! characters that arrive back to back. Reads assemble a line from
//! whatever the driver hands us, tolerating stray bare terminators on
//! the wire, and give up once the wall-clock timeout elapses.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::common::{Error, Result};

/// Interval between polls while the underlying channel has nothing for us
const POLL_INTERVAL: Duration = Duration::from_millis(1);

const READ_CHUNK_SIZE: usize = 1024;

/// A byte channel the transport can drive
///
/// `read_chunk` must not block: it returns `Ok(0)` when nothing is
/// pending. "Not open" surfaces as a read/write failure, never a panic.
pub trait RawChannel {
    /// Read whatever is pending, up to `buf.len()` bytes; `Ok(0)` if nothing
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes, returning how many were accepted
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Discard any input buffered in the driver
    fn clear_input(&mut self) -> Result<()>;

    /// Whether the channel is still usable
    fn is_open(&self) -> bool;
}

/// Line-terminated reads and paced writes over one raw channel
pub struct LineTransport {
    /// Channel label for diagnostics ('A' or 'B')
    label: char,
    channel: Box<dyn RawChannel + Send>,
    /// Bytes received but not yet consumed by a read
    pending: VecDeque<u8>,
    /// Delay between transmitted bytes
    pacing: Duration,
    /// Default read timeout
    timeout: Duration,
}

impl LineTransport {
    pub fn new(label: char, channel: Box<dyn RawChannel + Send>, pacing: Duration) -> Self {
        Self {
            label,
            channel,
            pending: VecDeque::new(),
            pacing,
            timeout: Duration::from_millis(100),
        }
    }

    /// Configured default read timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send one line: the payload (trailing script comment removed),
    /// byte by byte with the pacing delay, then CRLF
    ///
    /// Fails with [`Error::ShortWrite`] unless the total written count
    /// equals the payload length plus two.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        let payload = strip_trailing_comment(text);
        let expected = payload.len() + 2;
        let mut written = 0;

        for byte in payload.as_bytes() {
            written += self.channel.write_bytes(std::slice::from_ref(byte))?;
            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }
        written += self.channel.write_bytes(b"\r\n")?;

        if written < expected {
            return Err(Error::ShortWrite { written, expected });
        }
        Ok(())
    }

    /// Read one line, waiting at most `timeout`
    ///
    /// A terminator with zero accumulated characters is stray line noise
    /// and does not end the read; the loop keeps waiting within the same
    /// timeout budget. On timeout any partially assembled line is
    /// discarded.
    pub async fn read_line(&mut self, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        let mut line: Vec<u8> = Vec::new();

        loop {
            while let Some(byte) = self.pending.pop_front() {
                if byte == b'\n' || byte == b'\r' {
                    if !line.is_empty() {
                        return Ok(String::from_utf8_lossy(&line).into_owned());
                    }
                    // bare terminator: keep waiting
                } else {
                    line.push(byte);
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::ReadTimeout(timeout.as_millis() as u64));
            }

            if !self.channel.is_open() {
                self.pending.clear();
                return Err(Error::ChannelClosed(self.label));
            }

            let mut buf = [0u8; READ_CHUNK_SIZE];
            let n = self.channel.read_chunk(&mut buf)?;
            if n == 0 {
                // nothing pending; yield instead of spinning hot
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
            self.pending.extend(&buf[..n]);
        }
    }

    /// Discard buffered input and reset line-assembly state
    pub fn flush(&mut self) -> Result<()> {
        self.pending.clear();
        self.channel.clear_input()
    }
}

/// Remove a trailing `//...` or `#...` comment from a command payload
fn strip_trailing_comment(text: &str) -> &str {
    let mut end = text.len();
    if let Some(i) = text.find("//") {
        end = end.min(i);
    }
    if let Some(i) = text.find('#') {
        end = end.min(i);
    }
    text[..end].trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimChannel;

    fn transport(channel: SimChannel) -> LineTransport {
        LineTransport::new('A', Box::new(channel), Duration::ZERO)
    }

    #[test]
    fn comment_stripping() {
        assert_eq!(strip_trailing_comment("GET TEMP // cabinet"), "GET TEMP");
        assert_eq!(strip_trailing_comment("GET TEMP # cabinet"), "GET TEMP");
        assert_eq!(strip_trailing_comment("GET TEMP"), "GET TEMP");
        assert_eq!(strip_trailing_comment("# all comment"), "");
    }

    #[tokio::test]
    async fn write_line_appends_crlf() {
        let channel = SimChannel::new();
        let written = channel.written();
        let mut t = transport(channel);

        t.write_line("PING").await.unwrap();
        assert_eq!(written.lock().unwrap().as_slice(), b"PING\r\n");
    }

    #[tokio::test]
    async fn write_line_strips_script_comment() {
        let channel = SimChannel::new();
        let written = channel.written();
        let mut t = transport(channel);

        t.write_line("PING // say hello").await.unwrap();
        assert_eq!(written.lock().unwrap().as_slice(), b"PING\r\n");
    }

    #[tokio::test]
    async fn short_write_is_an_error() {
        let channel = SimChannel::new();
        channel.drop_writes();
        let mut t = transport(channel);

        let err = t.write_line("PING").await.unwrap_err();
        assert!(matches!(err, Error::ShortWrite { .. }));
    }

    #[tokio::test]
    async fn read_line_strips_terminator() {
        let channel = SimChannel::new();
        channel.enqueue("42 ok\r\n");
        let mut t = transport(channel);

        let line = t.read_line(Duration::from_millis(100)).await.unwrap();
        assert_eq!(line, "42 ok");
    }

    #[tokio::test]
    async fn bare_terminators_are_line_noise() {
        let channel = SimChannel::new();
        channel.enqueue("\r\n\n\rREADY\n");
        let mut t = transport(channel);

        let line = t.read_line(Duration::from_millis(100)).await.unwrap();
        assert_eq!(line, "READY");
    }

    #[tokio::test]
    async fn read_line_times_out() {
        let channel = SimChannel::new();
        let mut t = transport(channel);

        let start = std::time::Instant::now();
        let err = t.read_line(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, Error::ReadTimeout(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn partial_line_without_terminator_times_out() {
        let channel = SimChannel::new();
        channel.enqueue("NO TERMINATOR");
        let mut t = transport(channel);

        let err = t.read_line(Duration::from_millis(50)).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn consecutive_reads_share_buffered_input() {
        let channel = SimChannel::new();
        channel.enqueue("first\nsecond\n");
        let mut t = transport(channel);

        let timeout = Duration::from_millis(100);
        assert_eq!(t.read_line(timeout).await.unwrap(), "first");
        assert_eq!(t.read_line(timeout).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn flush_discards_pending_input() {
        let channel = SimChannel::new();
        channel.enqueue("stale\n");
        let mut t = transport(channel);

        t.flush().unwrap();
        assert!(t.read_line(Duration::from_millis(20)).await.is_err());
    }

    #[tokio::test]
    async fn closed_channel_fails_the_read() {
        let channel = SimChannel::new();
        channel.close();
        let mut t = transport(channel);

        let err = t.read_line(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, Error::ChannelClosed('A')));
    }
}
