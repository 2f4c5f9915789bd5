//! Tracing subscriber setup: stdout plus an optional daily-rolling file.

use anyhow::Result;
use std::ffi::OsString;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use tokenguard_types::models::config::LoggingConfig;

const DEFAULT_LOG_FILE: &str = "tokenguard.log";

/// Keeps the file writer flushing until dropped at the end of `main`.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{level}' ({e}), falling back to 'info'");
        EnvFilter::new("info")
    })
}

pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard> {
    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name =
                path.file_name().map_or_else(|| OsString::from(DEFAULT_LOG_FILE), OsString::from);
            std::fs::create_dir_all(dir)?;

            let appender = tracing_appender::rolling::daily(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()?;

    Ok(LogGuard { _file: guard })
}
