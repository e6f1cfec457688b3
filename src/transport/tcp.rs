//! TCP raw channel
//!
//! Used for bench setups where the instrument sits behind a serial
//! device server, and by the integration tests.

use std::io::{Read, Write};
use std::net::TcpStream;

use crate::common::{Error, Result};

use super::RawChannel;

/// A TCP connection as a raw byte channel
pub struct TcpChannel {
    stream: TcpStream,
    open: bool,
}

impl TcpChannel {
    /// Connect to `HOST:PORT`
    pub fn connect(addr: &str) -> Result<Self> {
        let stream =
            TcpStream::connect(addr).map_err(|e| Error::channel_open(addr, &e.to_string()))?;
        stream
            .set_nonblocking(true)
            .map_err(|e| Error::channel_open(addr, &e.to_string()))?;
        let _ = stream.set_nodelay(true);
        tracing::debug!(addr, "tcp channel open");
        Ok(Self { stream, open: true })
    }
}

impl RawChannel for TcpChannel {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.open {
            return Ok(0);
        }
        match self.stream.read(buf) {
            // EOF: peer closed the connection
            Ok(0) => {
                self.open = false;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => {
                self.open = false;
                Err(Error::Io(e))
            }
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize> {
        match self.stream.write(bytes) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => {
                self.open = false;
                Err(Error::Io(e))
            }
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        let mut buf = [0u8; 1024];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    self.open = false;
                    return Ok(());
                }
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
