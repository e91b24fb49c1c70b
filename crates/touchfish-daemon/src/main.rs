//! TouchFish daemon entry point.
//!
//! Speaks newline-delimited JSON on stdin/stdout; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use touchfish_core::config::Directories;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// TouchFish daemon - runs recipes for a presentation layer over stdio
#[derive(Parser, Debug)]
#[command(name = "touchfish-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Use this directory for config, data and recipes instead of the XDG locations
    #[arg(long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Do not watch the config file and recipe directories
    #[arg(long)]
    no_watch: bool,

    /// Activate this recipe on startup
    #[arg(long, value_name = "RECIPE")]
    activate: Option<String>,
}

/// Set up logging on stderr, since stdout carries the protocol.
/// In debug builds, defaults to debug level and also logs to a timestamped file.
/// Returns the log file path when one is written.
fn setup_logging(log_dir: &Path) -> Option<PathBuf> {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("touchfish={default_level}")));

    if cfg!(debug_assertions) {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("touchfish-daemon-{timestamp}.log");
        let log_path = log_dir.join(&log_filename);

        #[cfg(unix)]
        {
            let symlink_path = log_dir.join("touchfish-daemon.log");
            let _ = std::fs::remove_file(&symlink_path);
            let _ = std::os::unix::fs::symlink(&log_path, &symlink_path);
        }

        let file_appender = tracing_appender::rolling::never(log_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .with(filter)
            .init();

        eprintln!("Logging to: {} (and stderr)", log_path.display());
        Some(log_path)
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(true),
            )
            .with(filter)
            .init();
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let dirs = match args.base_dir {
        Some(base) => Directories::with_base(base),
        None => Directories::new(),
    };
    dirs.ensure_exists()
        .with_context(|| format!("Failed to create {}", dirs.config.display()))?;

    let _ = setup_logging(&dirs.log);

    info!("Starting touchfish daemon...");

    touchfish_daemon::run(dirs, !args.no_watch, args.activate)
        .await
        .context("Daemon failed")?;

    Ok(())
}
