use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// File name prefix of the daily log files (`modide.2024-05-01`)
pub const LOG_PREFIX: &str = "modide";

/// Filter used when `RUST_LOG` is not set.
///
/// Debug mode raises the crate's own level to `debug` and leaves dependencies at `info`.
pub fn default_filter(debug_mode: bool) -> EnvFilter {
    if debug_mode {
        EnvFilter::new("info,modide=debug")
    } else {
        EnvFilter::new("info")
    }
}

/// Create the log directory if needed.
pub fn ensure_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}

/// Setup logging to a daily rotating file, optionally mirrored to stderr.
///
/// `RUST_LOG` takes precedence over the level derived from `debug_mode`.
///
/// # Arguments
/// * `log_dir` - Directory for log files (e.g., "logs")
/// * `debug_mode` - If true, log the crate at debug level
/// * `console_output` - If true, also log to stderr
///
/// # Returns
/// A guard that must be held for the duration of the program so buffered lines are flushed
pub fn setup_logging(log_dir: &Utf8Path, debug_mode: bool, console_output: bool) -> Result<WorkerGuard> {
    ensure_log_dir(log_dir)?;

    let file_appender = rolling::daily(log_dir, LOG_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(debug_mode));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // Build output goes to stdout, so the console layer writes to stderr
    let console_layer = console_output.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}",
        log_dir,
        LOG_PREFIX,
        debug_mode,
        console_output
    );

    Ok(guard)
}
