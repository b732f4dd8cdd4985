//! Command-line interface module for autotidy.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing and configuration overrides
//! - Writing a starter configuration file
//! - Running the engine until Ctrl-C and reporting outcomes

use crate::config::AppConfig;
use crate::conflict::DuplicatePolicy;
use crate::engine::{EngineStatus, StopError, WatcherEngine};
use crate::outcome::MoveOutcome;
use crate::output::{OutcomeTally, OutputFormatter};
use crate::watch_config::WatchConfig;
use clap::Parser;
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

/// Watches a folder and files new arrivals into category folders.
#[derive(Debug, Clone, Parser)]
#[command(name = "autotidy", version, about)]
pub struct Cli {
    /// Configuration file (default: ./.autotidy.toml, then
    /// ~/.config/autotidy/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Folder to watch, overriding the configuration
    #[arg(short, long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// What to do when the destination name is taken: rename, skip or overwrite
    #[arg(short, long, value_name = "POLICY")]
    pub duplicates: Option<DuplicatePolicy>,

    /// Also organize files already in the folder at start
    #[arg(long)]
    pub catch_up: bool,

    /// Print one JSON object per outcome instead of colored lines
    #[arg(long)]
    pub json: bool,

    /// Write the default configuration to PATH and exit
    #[arg(long, value_name = "PATH")]
    pub init_config: Option<PathBuf>,

    /// Log debug details
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors; no spinner
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(source) = &self.source {
            config.source = source.display().to_string();
        }
        if let Some(policy) = self.duplicates {
            config.duplicates = policy;
        }
        if self.catch_up {
            config.catch_up = true;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputMode {
    json: bool,
    spinner: bool,
}

/// Runs the CLI application with the parsed arguments.
///
/// # Examples
///
/// ```no_run
/// use autotidy::cli::{Cli, run_cli};
/// use clap::Parser;
///
/// let cli = Cli::parse_from(["autotidy", "--source", "/home/user/Downloads"]);
/// if let Err(e) = run_cli(cli) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run_cli(cli: Cli) -> Result<(), String> {
    if let Some(path) = &cli.init_config {
        return write_default_config(path);
    }

    let mut app_config = AppConfig::load(cli.config.as_deref())
        .map_err(|e| format!("Error loading configuration: {}", e))?;
    cli.apply_overrides(&mut app_config);
    let config = app_config
        .into_watch_config()
        .map_err(|e| format!("Error in configuration: {}", e))?;

    let mode = OutputMode {
        json: cli.json,
        spinner: !cli.json && !cli.quiet,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Error starting runtime: {}", e))?;

    let tally = runtime.block_on(watch_until_interrupted(config, mode))?;
    if !mode.json {
        OutputFormatter::summary_table(&tally);
    }
    Ok(())
}

/// Writes the built-in configuration to `path`, refusing to overwrite.
pub fn write_default_config(path: &Path) -> Result<(), String> {
    if path.exists() {
        return Err(format!(
            "{} already exists; remove it first to regenerate",
            path.display()
        ));
    }
    AppConfig::default()
        .save(path)
        .map_err(|e| format!("Error writing configuration: {}", e))?;
    OutputFormatter::success(&format!("Wrote default configuration to {}", path.display()));
    Ok(())
}

async fn watch_until_interrupted(
    config: WatchConfig,
    mode: OutputMode,
) -> Result<OutcomeTally, String> {
    let engine = WatcherEngine::new();
    let mut outcomes = engine.subscribe();
    let mut status = engine.watch_status();
    let source = config.source.clone();

    engine
        .start(config)
        .await
        .map_err(|e| format!("Could not start watching: {}", e))?;

    if !mode.json {
        OutputFormatter::info(&format!(
            "Watching {} (Ctrl-C to stop)",
            source.display()
        ));
    }
    let spinner = mode
        .spinner
        .then(|| OutputFormatter::create_spinner(&format!("watching {}", source.display())));

    let mut tally = OutcomeTally::default();
    let mut faulted = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!(error = %e, "could not listen for Ctrl-C");
                }
                break;
            }
            received = outcomes.recv() => match received {
                Ok(outcome) => report(&outcome, &mut tally, mode, spinner.as_ref())?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "output fell behind; some outcomes were not shown");
                }
                Err(RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() || *status.borrow() == EngineStatus::Faulted {
                    faulted = true;
                    break;
                }
            }
        }
    }

    if let Some(spinner) = &spinner {
        spinner.set_message("stopping");
    }
    if let Err(StopError::GraceExceeded { abandoned }) = engine.stop().await {
        warn!(count = abandoned.len(), "some moves were still running at shutdown");
    }

    // Outcomes published while stopping, such as interrupted moves.
    loop {
        match outcomes.try_recv() {
            Ok(outcome) => report(&outcome, &mut tally, mode, spinner.as_ref())?,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if faulted {
        return Err(format!(
            "Lost the watch on {}; was the folder removed?",
            source.display()
        ));
    }
    Ok(tally)
}

fn report(
    outcome: &MoveOutcome,
    tally: &mut OutcomeTally,
    mode: OutputMode,
    spinner: Option<&ProgressBar>,
) -> Result<(), String> {
    tally.record(outcome);

    if mode.json {
        return OutputFormatter::json_outcome(outcome);
    }
    match spinner {
        Some(spinner) => {
            spinner.suspend(|| OutputFormatter::outcome(outcome));
            spinner.set_message(tally.status_line());
        }
        None => OutputFormatter::outcome(outcome),
    }
    Ok(())
}
