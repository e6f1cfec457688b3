//! Serial-port raw channel

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};

use crate::common::{Error, Result};

use super::RawChannel;

/// Poll timeout for the underlying port; the transport owns the real
/// read deadline, so a driver-level timeout just means "nothing pending"
const PORT_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// A serial port as a raw byte channel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Open a serial device at the given baud rate, 8N1
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(PORT_POLL_TIMEOUT)
            .open()
            .map_err(|e| Error::channel_open(path, &e.to_string()))?;
        tracing::debug!(path, baud, "serial channel open");
        Ok(Self { port })
    }
}

impl RawChannel for SerialChannel {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize> {
        Ok(self.port.write(bytes)?)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| Error::Io(e.into()))
    }

    fn is_open(&self) -> bool {
        // The crate has no direct liveness query; a failing status read
        // means the device went away.
        self.port.bytes_to_read().is_ok()
    }
}
