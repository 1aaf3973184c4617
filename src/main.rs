use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{LevelFilter, info};
use std::fs;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use healthcheck::domain::{CommandSpec, ERROR_PREFIX};
use healthcheck::progress::{ProgressEstimator, ProgressSink};
use healthcheck::report::{self, SystemInfo};
use healthcheck::runner::{LineSink, PROMPT, ProcessRunner, RunHandle};
use healthcheck::sequencer::{AlwaysConfirm, Confirm, NeverConfirm, RunSummary, Sequencer};

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

const EXIT_UNHEALTHY: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("healthcheck")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("healthcheck.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        // Level comes from config once it is loaded
        builder.filter_level(LevelFilter::Trace);
    }
    builder.target(env_logger::Target::Pipe(target)).init();
    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(LevelFilter::Info);
    }

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Apply the configured level unless RUST_LOG already decided it
fn apply_log_level(config: &Config, verbose: bool) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let configured = config
        .log_level
        .as_deref()
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    let level = if verbose { configured.max(LevelFilter::Debug) } else { configured };
    log::set_max_level(level);
}

fn print_line(line: &str) {
    if line.starts_with(ERROR_PREFIX) {
        println!("{}", line.red());
    } else if line.starts_with(PROMPT) {
        println!("{}", line.cyan());
    } else if line.starts_with("===") {
        println!("{}", line.bold());
    } else if line.starts_with("---") {
        println!("{}", line.yellow());
    } else {
        println!("{}", line);
    }
}

/// Line sink that prints and keeps a transcript for the report
fn transcript_sink(transcript: Arc<Mutex<Vec<String>>>, bar: Option<ProgressBar>) -> LineSink {
    Arc::new(move |line: &str| {
        match &bar {
            Some(bar) => bar.suspend(|| print_line(line)),
            None => print_line(line),
        }
        if let Ok(mut lines) = transcript.lock() {
            lines.push(line.to_string());
        }
    })
}

fn progress_bar() -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    Some(bar)
}

fn progress_sink(bar: ProgressBar) -> ProgressSink {
    Arc::new(move |fraction: f64, status: &str| {
        bar.set_position((fraction.clamp(0.0, 1.0) * 100.0).round() as u64);
        bar.set_message(status.to_string());
    })
}

/// Asks on the terminal; blocks the run until answered
fn stdin_confirm(title: &str, message: &str) -> bool {
    eprintln!();
    eprintln!("{}", title.yellow().bold());
    eprintln!("{}", message);
    eprint!("Proceed? [y/N] ");
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(e) => {
            log::warn!("Could not read confirmation: {}", e);
            false
        }
    }
}

fn confirm_strategy(
    yes: bool,
    no: bool,
    config: &Config,
    bar: Option<ProgressBar>,
) -> Option<Arc<dyn Confirm>> {
    if yes {
        Some(Arc::new(AlwaysConfirm))
    } else if no {
        Some(Arc::new(NeverConfirm))
    } else if std::io::stdin().is_terminal() {
        // The prompt must not be overdrawn by the bar
        Some(Arc::new(move |title: &str, message: &str| match &bar {
            Some(bar) => bar.suspend(|| stdin_confirm(title, message)),
            None => stdin_confirm(title, message),
        }))
    } else if config.sequence.assume_yes {
        None
    } else {
        Some(Arc::new(NeverConfirm))
    }
}

fn stop_on_ctrl_c(handle: RunHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", "Stopping...".yellow());
            handle.stop();
        }
    });
}

fn exit_code_for(summary: &RunSummary) -> i32 {
    if summary.cancelled {
        EXIT_INTERRUPTED
    } else if summary.overall().is_healthy() {
        0
    } else {
        EXIT_UNHEALTHY
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<i32> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::List => handle_list_command(config),
        Commands::Run {
            ids,
            yes,
            no,
            report,
            json,
        } => handle_run_command(ids, *yes, *no, report.as_deref(), *json, config).await,
        Commands::Exec { command, wide, argv } => {
            handle_exec_command(command, *wide, *argv, config).await
        }
    }
}

fn handle_list_command(config: &Config) -> Result<i32> {
    let catalog = config.catalog()?;
    println!("{}", "Available diagnostics:".green());
    for step in catalog.steps() {
        println!("  {:<14} {:<22} {}", step.id.cyan(), step.display_name, step.command.command());
        if let Some(follow_up) = &step.follow_up {
            println!("  {:<14} {:<22} -> {}", "", "", follow_up.step);
        }
    }
    Ok(0)
}

async fn handle_run_command(
    ids: &[String],
    yes: bool,
    no: bool,
    report_path: Option<&Path>,
    json: bool,
    config: &Config,
) -> Result<i32> {
    info!("Running diagnostics: {:?}", ids);
    let transcript = Arc::new(Mutex::new(Vec::new()));
    let bar = progress_bar();

    let mut sequencer = Sequencer::new(config.catalog()?)
        .with_config(config.sequence.to_sequencer_config())
        .with_runner_config(config.runner.to_runner_config())
        .with_estimator(ProgressEstimator::new(config.progress.to_progress_config()))
        .with_sink(transcript_sink(transcript.clone(), bar.clone()));
    if let Some(bar) = &bar {
        sequencer = sequencer.with_progress(progress_sink(bar.clone()));
    }
    if let Some(confirm) = confirm_strategy(yes, no, config, bar.clone()) {
        sequencer = sequencer.with_confirm(confirm);
    }

    let mut session = sequencer.spawn(ids.to_vec());
    stop_on_ctrl_c(session.handle());
    while let Some(report) = session.next_report().await {
        log::debug!("{} finished: {}", report.step_id, report.classification.message);
    }
    let summary = session.wait().await.context("Diagnostic run failed")?;
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    if json {
        let text = serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
        println!("{}", text);
    }

    if let Some(path) = report_path {
        let lines = transcript.lock().map(|t| t.join("\n")).unwrap_or_default();
        let drive = config.drive.clone();
        let system = tokio::task::spawn_blocking(move || SystemInfo::gather(&drive))
            .await
            .context("Failed to gather system information")?;
        let text = report::render(&summary, &lines, &system, &chrono::Local::now());
        fs::write(path, text).context(format!("Failed to write report to {}", path.display()))?;
        println!("{} {}", "Report saved to:".green(), path.display());
    }

    Ok(exit_code_for(&summary))
}

async fn handle_exec_command(
    command: &[String],
    wide: bool,
    argv: bool,
    config: &Config,
) -> Result<i32> {
    let spec = if argv {
        CommandSpec::argv(shell_words::join(command))
    } else {
        CommandSpec::shell(command.join(" "))
    };
    let spec = if wide { spec.wide() } else { spec };
    info!("Executing: {}", spec.command());

    let runner =
        ProcessRunner::new(config.runner.to_runner_config()).with_sink(Arc::new(print_line));
    stop_on_ctrl_c(runner.handle());
    let result = runner.run(&spec).await;

    Ok(if result.cancelled {
        EXIT_INTERRUPTED
    } else if result.succeeded {
        0
    } else if (1..=255).contains(&result.exit_code) {
        result.exit_code
    } else {
        EXIT_UNHEALTHY
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    apply_log_level(&config, cli.is_verbose());

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    let code = run_application(&cli, &config).await.context("Application failed")?;
    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}
