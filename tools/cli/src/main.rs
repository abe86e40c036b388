//! treemirror CLI - periodic one-way folder mirroring.
//!
//! Usage:
//! ```bash
//! treemirror <SOURCE> <REPLICA> <LOG_FILE> <INTERVAL_SECONDS>
//! treemirror ./source ./replica ./sync.log 30
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use treemirror_sync::{AuditLogger, CompareMode, ErrorPolicy, SyncConfig, SyncScheduler};

/// Exit status for invocation errors.
const USAGE_EXIT_CODE: i32 = 1;

#[derive(Parser)]
#[command(name = "treemirror")]
#[command(about = "Periodically mirror a source folder onto a replica folder")]
#[command(version)]
struct Cli {
    /// Folder to mirror from.
    source: PathBuf,

    /// Folder kept identical to the source.
    replica: PathBuf,

    /// File the audit trail is appended to.
    log_file: PathBuf,

    /// Seconds to wait after a pass before starting the next one.
    interval: u64,

    /// Enable verbose diagnostics on stderr.
    #[arg(short, long)]
    verbose: bool,

    /// File comparison: "content" (byte-exact) or "metadata" (size and mtime).
    #[arg(long, default_value = "content")]
    compare: CompareMode,

    /// Record failing entries and continue instead of aborting the pass.
    #[arg(long)]
    keep_going: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            let _ = err.print();
            std::process::exit(USAGE_EXIT_CODE);
        }
    };

    // Diagnostics go to stderr; stdout carries the audit trail.
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let on_error = if cli.keep_going {
        ErrorPolicy::Continue
    } else {
        ErrorPolicy::Abort
    };

    let config = SyncConfig::new(&cli.source, &cli.replica)
        .with_interval(Duration::from_secs(cli.interval))
        .with_compare_mode(cli.compare)
        .with_error_policy(on_error);

    config.validate().context("Invalid folder layout")?;
    config
        .check_log_location(&cli.log_file)
        .context("Invalid log file location")?;

    debug!("Configuration: {:?}", config);

    let log = AuditLogger::open(&cli.log_file).with_context(|| {
        format!("Failed to open log file {}", cli.log_file.display())
    })?;

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone())?;

    info!("Mirroring {} to {}", cli.source.display(), cli.replica.display());

    SyncScheduler::new(config, Arc::new(log))
        .run(cancel)
        .await
        .context("Synchronization failed")?;

    Ok(())
}

/// Cancel `cancel` on SIGINT/SIGTERM (Ctrl+C elsewhere).
///
/// Handlers are registered before returning so no signal is missed once
/// the first pass starts.
fn spawn_shutdown_listener(cancel: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => debug!("Received SIGINT"),
                _ = sigterm.recv() => debug!("Received SIGTERM"),
            }
            info!("Shutdown signal received, stopping after the current step");
            cancel.cancel();
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl+C received, stopping after the current step");
                    cancel.cancel();
                }
                Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
            }
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_positionals() {
        let cli = Cli::try_parse_from(["treemirror", "src", "dst", "sync.log", "30"]).unwrap();
        assert_eq!(cli.source, PathBuf::from("src"));
        assert_eq!(cli.replica, PathBuf::from("dst"));
        assert_eq!(cli.log_file, PathBuf::from("sync.log"));
        assert_eq!(cli.interval, 30);
        assert_eq!(cli.compare, CompareMode::Content);
        assert!(!cli.keep_going);
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "treemirror",
            "--compare",
            "metadata",
            "--keep-going",
            "src",
            "dst",
            "sync.log",
            "0",
        ])
        .unwrap();
        assert_eq!(cli.compare, CompareMode::SizeAndMtime);
        assert!(cli.keep_going);
        assert_eq!(cli.interval, 0);
    }

    #[test]
    fn test_wrong_argument_count() {
        assert!(Cli::try_parse_from(["treemirror", "src", "dst", "sync.log"]).is_err());
        assert!(Cli::try_parse_from(["treemirror", "src", "dst", "sync.log", "1", "2"]).is_err());
    }

    #[test]
    fn test_interval_must_be_non_negative_integer() {
        assert!(Cli::try_parse_from(["treemirror", "src", "dst", "log", "-5"]).is_err());
        assert!(Cli::try_parse_from(["treemirror", "src", "dst", "log", "1.5"]).is_err());
        assert!(Cli::try_parse_from(["treemirror", "src", "dst", "log", "soon"]).is_err());
    }
}
