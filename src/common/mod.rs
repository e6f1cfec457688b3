//! Common utilities shared between the engine and the CLI

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
