//! Collaborator interfaces consumed by the engine
//!
//! The engine makes no presentation decisions beyond a three-way
//! classification of its output lines: narration, muted diagnostic
//! text, and failures.

use async_trait::async_trait;

use crate::common::Result;

/// Sink for the engine's pass/fail narration
pub trait LogSink: Send + Sync {
    /// Narration: commands echoed, passing checks, test headers
    fn black(&self, line: &str);

    /// Muted text: comments, sleeps, raw script lines
    fn gray(&self, line: &str);

    /// Failures and diagnostics
    fn red(&self, line: &str);
}

/// Operator interaction, blocking from the engine's point of view
#[async_trait]
pub trait Operator: Send + Sync {
    /// Ask a yes/no question; `false` fails the current test
    async fn ask_yes_no(&self, text: &str) -> Result<bool>;

    /// Display text and wait for acknowledgement
    async fn notify(&self, text: &str) -> Result<()>;
}
