//! CLI command handling
//!
//! Dispatches CLI commands and formats console output. The console is
//! where the log sink and the operator prompts live; everything below
//! this module is UI-agnostic.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::engine::{AbortSignal, Engine, LogSink, Operator, RunOutcome};
use crate::script::Script;
use crate::transport::{self, LineTransport};

/// Reserved test names that run as handlers, not as ordinary tests
const ON_ABORT: &str = "OnAbort";
const ON_EXIT: &str = "OnExit";

const DEFAULT_CONFIG_PATH: &str = "rigtest.toml";

/// Log sink that writes to the terminal, color-coded by severity
struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn black(&self, line: &str) {
        println!("{line}");
    }

    fn gray(&self, line: &str) {
        println!("{}", line.dimmed());
    }

    fn red(&self, line: &str) {
        println!("{}", line.red());
    }
}

/// Operator backed by stdin; prompts block a worker thread, not the runtime
struct ConsoleOperator;

impl ConsoleOperator {
    async fn read_stdin_line() -> Result<String> {
        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| Error::Operator(e.to_string()))?
    }
}

#[async_trait]
impl Operator for ConsoleOperator {
    async fn ask_yes_no(&self, prompt: &str) -> Result<bool> {
        print!("{} [y/N] ", prompt.bold());
        std::io::stdout().flush()?;
        let answer = Self::read_stdin_line().await?;
        Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "Yes" | "YES"))
    }

    async fn notify(&self, message: &str) -> Result<()> {
        print!("{} (press Enter to continue) ", message.bold());
        std::io::stdout().flush()?;
        Self::read_stdin_line().await?;
        Ok(())
    }
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::List { script } => list(&script),
        Commands::Check { script } => check(&script),
        Commands::Run {
            script,
            tests,
            port_a,
            port_b,
            timeout_a,
            timeout_b,
            terminate_on_error,
            config,
        } => {
            run(RunArgs {
                script,
                tests,
                port_a,
                port_b,
                timeout_a,
                timeout_b,
                terminate_on_error,
                config,
            })
            .await
        }
    }
}

fn list(path: &Path) -> Result<()> {
    let script = Script::load(path)?;
    report_diagnostics(&script);

    if let Some(version) = script.version() {
        println!("Script version: {version}");
    }
    if script.test_count() == 0 {
        println!("No tests in {}", path.display());
        return Ok(());
    }
    for n in 0..script.test_count() {
        let name = script.test_name(n).unwrap_or("<unnamed>");
        if name == ON_ABORT || name == ON_EXIT {
            println!("  {n:3}  {name} (handler)");
        } else {
            println!("  {n:3}  {name}");
        }
    }
    Ok(())
}

fn check(path: &Path) -> Result<()> {
    let script = Script::load(path)?;
    report_diagnostics(&script);

    let malformed = script.diagnostics().len();
    if malformed > 0 {
        return Err(Error::MalformedScript(malformed));
    }
    println!(
        "OK: {} command(s), {} test(s)",
        script.commands().len(),
        script.test_count()
    );
    Ok(())
}

struct RunArgs {
    script: PathBuf,
    tests: Vec<String>,
    port_a: Option<String>,
    port_b: Option<String>,
    timeout_a: Option<u64>,
    timeout_b: Option<u64>,
    terminate_on_error: bool,
    config: Option<PathBuf>,
}

async fn run(args: RunArgs) -> Result<()> {
    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Config::load(&config_path)?;

    let script = Script::load(&args.script)?;
    report_diagnostics(&script);

    let selection = resolve_selection(&script, &args.tests)?;
    if selection.is_empty() {
        println!("Nothing to run in {}", args.script.display());
        return Ok(());
    }

    let spec_a = args
        .port_a
        .or_else(|| config.ports.a.clone())
        .ok_or_else(|| Error::Config("channel A endpoint not set (use --port-a or the config file)".into()))?;
    let spec_b = args
        .port_b
        .or_else(|| config.ports.b.clone())
        .ok_or_else(|| Error::Config("channel B endpoint not set (use --port-b or the config file)".into()))?;

    let pacing = Duration::from_millis(config.ports.output_delay_ms);
    let channel_a = LineTransport::new('A', transport::open_channel(&spec_a, config.ports.baud)?, pacing);
    let channel_b = LineTransport::new('B', transport::open_channel(&spec_b, config.ports.baud)?, pacing);

    let abort = AbortSignal::new();
    spawn_ctrl_c_handler(abort.clone());

    let mut engine = Engine::new(
        channel_a,
        channel_b,
        Box::new(ConsoleSink),
        Box::new(ConsoleOperator),
        abort.clone(),
    );
    engine.set_channel_timeouts(
        Duration::from_millis(args.timeout_a.unwrap_or(config.timeouts.channel_a_ms)),
        Duration::from_millis(args.timeout_b.unwrap_or(config.timeouts.channel_b_ms)),
    );
    engine.set_terminate_on_error(args.terminate_on_error || config.run.terminate_on_error);

    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut aborted = false;

    for n in selection {
        let name = script.test_name(n).unwrap_or("<unnamed>").to_string();
        let outcome = engine.run_test(&script, n).await;

        match outcome {
            RunOutcome::Completed if !engine.saw_error() => {
                passed += 1;
                println!("{} {name}", "PASS".green().bold());
            }
            RunOutcome::Completed => {
                failed += 1;
                if engine.terminated_early() {
                    println!("{} {name} (terminated early)", "FAIL".red().bold());
                } else {
                    println!("{} {name}", "FAIL".red().bold());
                }
            }
            RunOutcome::Aborted => {
                failed += 1;
                println!("{} {name}", "ABORTED".red().bold());
                aborted = true;
                break;
            }
        }
    }

    if aborted {
        if let Some(n) = script.find_test_by_name(ON_ABORT) {
            // the handler itself must be allowed to run
            abort.clear();
            println!("Running {ON_ABORT} handler");
            engine.run_test(&script, n).await;
        }
    }
    if let Some(n) = script.find_test_by_name(ON_EXIT) {
        abort.clear();
        println!("Running {ON_EXIT} handler");
        engine.run_test(&script, n).await;
    }

    println!("{passed} passed, {failed} failed");
    if failed > 0 {
        return Err(Error::TestsFailed(failed));
    }
    Ok(())
}

/// Map `--test` selectors to script test indices
///
/// A selector is a 0-based index or a test name. With no selectors,
/// every test runs except the reserved handlers.
fn resolve_selection(script: &Script, selectors: &[String]) -> Result<Vec<usize>> {
    if selectors.is_empty() {
        return Ok((0..script.test_count())
            .filter(|&n| {
                !matches!(script.test_name(n), Some(ON_ABORT) | Some(ON_EXIT))
            })
            .collect());
    }

    selectors
        .iter()
        .map(|selector| {
            if let Ok(n) = selector.parse::<usize>() {
                if n < script.test_count() {
                    return Ok(n);
                }
            }
            script
                .find_test_by_name(selector)
                .ok_or_else(|| Error::TestNotFound(selector.clone()))
        })
        .collect()
}

fn report_diagnostics(script: &Script) {
    for diagnostic in script.diagnostics() {
        eprintln!("{} {diagnostic}", "warning:".yellow().bold());
    }
}

fn spawn_ctrl_c_handler(abort: AbortSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, requesting abort");
            abort.request();
        }
    });
}
