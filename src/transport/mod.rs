//! Channel transport: line-framed I/O over two independent byte channels
//!
//! The engine only ever talks to a [`LineTransport`], which handles the
//! paced writes, line assembly and timeout bookkeeping on top of a
//! [`RawChannel`]. Raw channels exist for serial ports and TCP sockets;
//! tests use the simulated channel from `crate::testing`.

pub mod channel;
pub mod serial;
pub mod tcp;

pub use channel::{LineTransport, RawChannel};

use crate::common::{Error, Result};

/// Open a raw channel from an endpoint spec string
///
/// Accepted forms: `tcp:HOST:PORT`, or a serial device path with an
/// optional `:BAUD` suffix (`/dev/ttyUSB0`, `/dev/ttyUSB0:115200`).
pub fn open_channel(spec: &str, default_baud: u32) -> Result<Box<dyn RawChannel + Send>> {
    match parse_spec(spec, default_baud)? {
        Endpoint::Tcp(addr) => Ok(Box::new(tcp::TcpChannel::connect(&addr)?)),
        Endpoint::Serial { path, baud } => Ok(Box::new(serial::SerialChannel::open(&path, baud)?)),
    }
}

#[derive(Debug, PartialEq)]
enum Endpoint {
    Tcp(String),
    Serial { path: String, baud: u32 },
}

fn parse_spec(spec: &str, default_baud: u32) -> Result<Endpoint> {
    if let Some(addr) = spec.strip_prefix("tcp:") {
        if addr.is_empty() {
            return Err(Error::ChannelSpec(spec.to_string()));
        }
        return Ok(Endpoint::Tcp(addr.to_string()));
    }
    if spec.is_empty() {
        return Err(Error::ChannelSpec(spec.to_string()));
    }

    // Trailing `:BAUD` on a device path overrides the default rate
    if let Some((path, suffix)) = spec.rsplit_once(':') {
        if let Ok(baud) = suffix.parse::<u32>() {
            if path.is_empty() {
                return Err(Error::ChannelSpec(spec.to_string()));
            }
            return Ok(Endpoint::Serial {
                path: path.to_string(),
                baud,
            });
        }
    }

    Ok(Endpoint::Serial {
        path: spec.to_string(),
        baud: default_baud,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_spec() {
        assert_eq!(
            parse_spec("tcp:127.0.0.1:7777", 9600).unwrap(),
            Endpoint::Tcp("127.0.0.1:7777".to_string())
        );
    }

    #[test]
    fn parses_serial_spec_with_default_baud() {
        assert_eq!(
            parse_spec("/dev/ttyUSB0", 9600).unwrap(),
            Endpoint::Serial {
                path: "/dev/ttyUSB0".to_string(),
                baud: 9600
            }
        );
    }

    #[test]
    fn parses_serial_spec_with_baud_suffix() {
        assert_eq!(
            parse_spec("/dev/ttyUSB0:115200", 9600).unwrap(),
            Endpoint::Serial {
                path: "/dev/ttyUSB0".to_string(),
                baud: 115200
            }
        );
    }

    #[test]
    fn rejects_empty_specs() {
        assert!(parse_spec("", 9600).is_err());
        assert!(parse_spec("tcp:", 9600).is_err());
        assert!(parse_spec(":115200", 9600).is_err());
    }
}
