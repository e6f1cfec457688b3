//! CLI command definitions
//!
//! Defines the clap commands for the test runner CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// List the tests a script contains
    #[command(alias = "ls")]
    List {
        /// Path to the test script
        script: PathBuf,
    },

    /// Parse a script and report malformed lines without running anything
    Check {
        /// Path to the test script
        script: PathBuf,
    },

    /// Run tests from a script against the connected instruments
    Run {
        /// Path to the test script
        script: PathBuf,

        /// Test to run, by 0-based index or by name
        /// Can be specified multiple times; omit to run every test
        #[arg(long = "test", short = 't')]
        tests: Vec<String>,

        /// Channel A endpoint: serial device path (with optional :BAUD) or tcp:HOST:PORT
        #[arg(long)]
        port_a: Option<String>,

        /// Channel B endpoint: serial device path (with optional :BAUD) or tcp:HOST:PORT
        #[arg(long)]
        port_b: Option<String>,

        /// Read timeout for channel A in milliseconds
        #[arg(long)]
        timeout_a: Option<u64>,

        /// Read timeout for channel B in milliseconds
        #[arg(long)]
        timeout_b: Option<u64>,

        /// Stop a test after its first failing command
        #[arg(long)]
        terminate_on_error: bool,

        /// Path to the configuration file (default: rigtest.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
