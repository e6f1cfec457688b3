//! Script model: the command language and the loaded command sequence
//!
//! A script is a plain text file with one command per line. The parser
//! never fails; anything it cannot understand becomes an `Unknown`
//! command and the caller decides how loud to be about it.

pub mod command;
pub mod store;

pub use command::{ChannelId, Command, CommandKind};
pub use store::{LoadDiagnostic, Script};
