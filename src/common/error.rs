//! Error types for the test runner
//!
//! These cover hard failures only: unreadable scripts, unusable channels,
//! bad configuration. Per-command test failures are not errors - the
//! engine records them on its error flag and reports them through the
//! log sink, so a failing test still runs to completion.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the test runner
#[derive(Error, Debug)]
pub enum Error {
    // === Script Errors ===
    #[error("Could not open script file '{path}': {error}")]
    ScriptOpen { path: String, error: String },

    #[error("Failed to read script: {0}")]
    ScriptRead(#[source] io::Error),

    #[error("No test named '{0}' in the loaded script")]
    TestNotFound(String),

    #[error("Script contains {0} malformed line(s)")]
    MalformedScript(usize),

    #[error("{0} test(s) failed")]
    TestsFailed(usize),

    // === Channel Errors ===
    #[error("Channel {0} closed")]
    ChannelClosed(char),

    #[error("Read timed out after {0} ms")]
    ReadTimeout(u64),

    #[error("Short write: sent {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("Failed to open channel '{spec}': {reason}")]
    ChannelOpen { spec: String, reason: String },

    #[error("Invalid channel spec '{0}': expected a serial device path or tcp:HOST:PORT")]
    ChannelSpec(String),

    // === Operator Errors ===
    #[error("Operator interaction failed: {0}")]
    Operator(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },
}

impl Error {
    /// Create a script-open error from an io failure
    pub fn script_open(path: &str, error: &io::Error) -> Self {
        Self::ScriptOpen {
            path: path.to_string(),
            error: error.to_string(),
        }
    }

    /// Create a channel-open error
    pub fn channel_open(spec: &str, reason: &str) -> Self {
        Self::ChannelOpen {
            spec: spec.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True if this error is a read timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReadTimeout(_))
    }
}
