//! rigtest - scripted functional testing of serial-attached instruments
//!
//! This library drives a scripted command sequence over two independent
//! byte channels (instrument and fixture), validates the responses, and
//! produces a pass/fail verdict per test.

pub mod cli;
pub mod commands;
pub mod common;
pub mod engine;
pub mod script;
pub mod testing;
pub mod transport;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use engine::{AbortSignal, Engine, RunOutcome};
pub use script::{ChannelId, Command, CommandKind, Script};
