//! Configuration file handling

use serde::Deserialize;
use std::path::Path;

use super::Result;

/// Main configuration structure, read from `rigtest.toml`
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Channel endpoint settings
    #[serde(default)]
    pub ports: Ports,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Run behavior settings
    #[serde(default)]
    pub run: RunConfig,
}

/// Channel endpoint settings
///
/// A spec is either a serial device path (`/dev/ttyUSB0`, optionally with
/// a `:BAUD` suffix) or `tcp:HOST:PORT`.
#[derive(Debug, Deserialize, Default)]
pub struct Ports {
    /// Channel A (instrument) endpoint
    #[serde(default)]
    pub a: Option<String>,

    /// Channel B (fixture) endpoint
    #[serde(default)]
    pub b: Option<String>,

    /// Baud rate for serial endpoints without an explicit suffix
    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Delay between transmitted bytes; the instrument drops characters
    /// when they arrive back to back
    #[serde(default = "default_output_delay")]
    pub output_delay_ms: u64,
}

fn default_baud() -> u32 {
    9600
}
fn default_output_delay() -> u64 {
    120
}

/// Timeout settings in milliseconds
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Read timeout for channel A
    #[serde(default = "default_channel_timeout")]
    pub channel_a_ms: u64,

    /// Read timeout for channel B
    #[serde(default = "default_channel_timeout")]
    pub channel_b_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            channel_a_ms: default_channel_timeout(),
            channel_b_ms: default_channel_timeout(),
        }
    }
}

fn default_channel_timeout() -> u64 {
    100
}

/// Run behavior settings
#[derive(Debug, Deserialize, Default)]
pub struct RunConfig {
    /// Stop the current test after the first failing command
    #[serde(default)]
    pub terminate_on_error: bool,
}

impl Config {
    /// Load configuration from the given file
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing() {
        let config = Config::load(Path::new("/nonexistent/rigtest.toml")).unwrap();
        assert_eq!(config.timeouts.channel_a_ms, 100);
        assert_eq!(config.ports.output_delay_ms, 120);
        assert!(!config.run.terminate_on_error);
    }

    #[test]
    fn parses_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rigtest.toml");
        std::fs::write(
            &path,
            "[ports]\na = \"tcp:127.0.0.1:7777\"\n\n[timeouts]\nchannel_b_ms = 250\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.ports.a.as_deref(), Some("tcp:127.0.0.1:7777"));
        assert_eq!(config.timeouts.channel_a_ms, 100);
        assert_eq!(config.timeouts.channel_b_ms, 250);
    }

    #[test]
    fn rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rigtest.toml");
        std::fs::write(&path, "[ports\n").unwrap();

        assert!(Config::load(&path).is_err());
    }
}
