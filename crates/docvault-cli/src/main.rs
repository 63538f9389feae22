//! docvault CLI - backups, restores and disaster recovery from the command line
//!
//! Every command prints one JSON report on stdout and exits non-zero when any
//! step failed. Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docvault::VaultConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod commands;

#[derive(Parser)]
#[command(name = "docvault")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// JSON configuration file; DOCVAULT_* variables override it
    #[arg(short, long, env = "DOCVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Cancel the operation after this many seconds
    #[arg(long)]
    deadline: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the source database and upload it as a new archive
    Backup {
        /// Key prefix (defaults to the configured one)
        #[arg(long)]
        prefix: Option<String>,

        /// Tag appended to the archive name
        #[arg(long)]
        tag: Option<String>,
    },

    /// Replace the collections of a database with those of an archive
    Restore {
        /// Archive key
        key: String,

        /// Database to restore into (defaults to the configured target)
        #[arg(long)]
        target: Option<String>,
    },

    /// Restore an archive into a disposable database and run smoke checks
    Verify {
        /// Archive key (defaults to the newest archive)
        key: Option<String>,
    },

    /// Restore the newest archive into the target, migrate and verify
    Recover {
        /// Database to recover (defaults to the configured target)
        #[arg(long)]
        target: Option<String>,

        /// Only select the archive; touch nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// List objects under a prefix, newest first
    List {
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Delete all but the newest archives
    Prune {
        /// Archives to keep; 0 disables pruning
        #[arg(long)]
        keep: usize,

        #[arg(long)]
        prefix: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            commands::print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<VaultConfig> {
    let mut config = match path {
        Some(path) => VaultConfig::from_file(path)?,
        None => VaultConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<bool> {
    let config = load_config(cli.config.as_ref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let cancel = CancellationToken::new();
        spawn_cancellation(cancel.clone(), cli.deadline);

        // Execute command
        match cli.command {
            Commands::Backup { prefix, tag } => {
                commands::backup::execute(config, prefix, tag, &cancel).await
            }
            Commands::Restore { key, target } => {
                commands::restore::execute(config, key, target, &cancel).await
            }
            Commands::Verify { key } => commands::verify::execute(config, key, &cancel).await,
            Commands::Recover { target, dry_run } => {
                commands::recover::execute(config, target, dry_run, &cancel).await
            }
            Commands::List { prefix } => commands::storage::list(config, prefix).await,
            Commands::Prune { keep, prefix } => {
                commands::storage::prune(config, keep, prefix).await
            }
        }
    })
}

/// Cancel on Ctrl-C or when the deadline passes
fn spawn_cancellation(cancel: CancellationToken, deadline: Option<u64>) {
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    if let Some(secs) = deadline {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            tracing::warn!(deadline_secs = secs, "deadline reached, cancelling");
            cancel.cancel();
        });
    }
}
