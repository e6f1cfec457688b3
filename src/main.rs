//! rigtest - scripted functional test runner for bench instruments
//!
//! Drives devices under test over two line-oriented channels (serial or
//! TCP), executing plain-text test scripts and reporting pass/fail per
//! test.

use clap::Parser;
use rigtest::{cli, commands, common};

use commands::Commands;

#[derive(Parser)]
#[command(name = "rigtest", about = "Scripted functional test runner")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    common::logging::init_cli();

    let cli = Cli::parse();

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
