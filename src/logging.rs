//! Console and file logging.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_NAME: &str = "clonehero_scores.log";
const DEFAULT_LOG_FILTER: &str = "info";

/// Picks the filter directive: `RUST_LOG`, else `LOG_LEVEL`, else "info".
fn filter_directive(lookup: impl Fn(&str) -> Option<String>) -> String {
    lookup("RUST_LOG")
        .filter(|v| !v.trim().is_empty())
        .or_else(|| lookup("LOG_LEVEL").filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

/// Installs the global subscriber: colored console output plus a plain
/// text log file in `log_dir`.
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the life of the process.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create logs directory: {}", log_dir.display()))?;

    let mut directive = filter_directive(|name| std::env::var(name).ok());
    if let Err(e) = EnvFilter::try_new(&directive) {
        eprintln!("Invalid log filter {:?} ({}), using {}", directive, e, DEFAULT_LOG_FILTER);
        directive = DEFAULT_LOG_FILTER.to_string();
    }

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(&directive)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::new(&directive)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Routes panics from any thread into the log.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");

        tracing::error!("[PANIC] thread '{}'{}: {}", thread_name, location, msg);
    }));
}
