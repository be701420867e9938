use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use backup_home::config::AppConfig;
use backup_home::context::AppContext;
use backup_home::core::models::{Destination, format_bytes};
use backup_home::core::{ArchiverKind, PreviewSummary, RunOptions, TracingSink};
use backup_home::logging::{self, LogConfig};
use backup_home::platform::Platform;
use clap::error::ErrorKind;
use clap::{ArgAction, Args, Parser};
use serde::Serialize;
use tracing::{error, info};

const EXAMPLES: &str = "Examples:
    backup-home drive:
    backup-home gdrive:backup/home
    backup-home remote:path/to/backup/dir";

#[derive(Parser)]
#[command(name = "backup-home")]
#[command(about = "Backup home directory and upload to rclone destination", long_about = None)]
#[command(after_help = EXAMPLES, arg_required_else_help = true)]
struct Cli {
    /// Rclone destination path (e.g., "drive:", "gdrive:backup/home")
    destination: String,

    /// Preview what would be done without actually doing it
    #[arg(long)]
    preview: bool,

    /// Configuration file (defaults to ~/.config/backup-home.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    args: RunArgs,
}

#[derive(Args, Serialize)]
struct RunArgs {
    /// Source directory to backup (defaults to home directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, short)]
    source: Option<PathBuf>,

    /// Show debug logging and every archived file
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, short)]
    verbose: bool,

    /// Additional pattern to exclude from the archive (repeatable)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[arg(long = "exclude", value_name = "PATTERN")]
    excludes: Vec<String>,

    /// Skip the built-in platform exclude list
    #[serde(skip_serializing_if = "is_true")]
    #[arg(long = "no-default-excludes", action = ArgAction::SetFalse)]
    use_default_excludes: bool,

    /// Archiver to use instead of the platform default
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    archiver: Option<ArchiverKind>,

    /// Emit logs as JSON
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long)]
    json_logs: bool,
}

fn is_true(value: &bool) -> bool {
    *value
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let config = match AppConfig::new(cli.config.as_deref(), Some(&cli.args)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
    });

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    // Reject a bad destination before anything else happens.
    cli.destination.parse::<Destination>()?;

    let source = config.source_directory()?;

    if cli.preview {
        // Printed directly so log filtering cannot hide it.
        print!("{}", PreviewSummary::new(&source, &cli.destination)?);
        return Ok(());
    }

    let exclude_patterns = config.exclude_patterns(Platform::current());
    let verbose = config.verbose;
    let ctx = AppContext::new(config, Arc::new(TracingSink));

    let summary = ctx
        .orchestrator()?
        .run(RunOptions {
            destination: cli.destination,
            source,
            exclude_patterns,
            verbose,
        })
        .await?;

    info!(
        "Backed up {} and uploaded {} in {}s",
        format_bytes(summary.archive.size_bytes),
        format_bytes(summary.transfer.bytes_transferred),
        (summary.finished_at - summary.started_at).num_seconds()
    );

    Ok(())
}
