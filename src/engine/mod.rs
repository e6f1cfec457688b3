//! Test execution: the per-test state machine and its collaborators

pub mod abort;
pub mod runner;
pub mod sink;

pub use abort::AbortSignal;
pub use runner::{Engine, RunOutcome};
pub use sink::{LogSink, Operator};
