//! Logging initialization.
//!
//! Logs always go to stderr: in stdio mode stdout carries the protocol and
//! must never see a log line. An optional file layer writes the same events
//! without ANSI colours.
//!
//! `RUST_LOG` takes precedence over the configured level and accepts full
//! filter directives (e.g. `termhub::session=trace`).

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter directive for a configured level.
///
/// `verbose` raises anything below debug to debug.
pub fn filter_directive(level: &str, verbose: bool) -> String {
    let level = level.to_lowercase();
    if verbose && !matches!(level.as_str(), "debug" | "trace") {
        "debug".to_string()
    } else {
        level
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped and must be
/// kept alive for the lifetime of the process.
pub fn init_logging(
    level: &str,
    verbose: bool,
    log_file: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level, verbose)));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(false)
        .boxed();

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (directory, file_name) = split_log_path(path)?;
            std::fs::create_dir_all(directory).with_context(|| {
                format!("Failed to create log directory {}", directory.display())
            })?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn split_log_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((directory, file_name))
}
