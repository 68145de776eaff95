///! Logging configuration module
///!
///! Stdout carries the plugin status line, so console logs always go to stderr.

use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingSettings;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,              // log level (trace, debug, info, warn, error)
    pub file_path: Option<PathBuf>, // log file path
    pub json_format: bool,          // use JSON formatting on the console
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file_path: None,
            json_format: false,
        }
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            file_path: settings.file_path.clone(),
            json_format: settings.json,
        }
    }
}

impl LoggingConfig {
    /// Initialize logging based on configuration
    ///
    /// The returned guard flushes the file writer on drop and must be held
    /// until the process exits.
    pub fn init(&self) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))?;

        let console_layer = if self.json_format {
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .json()
                .with_writer(io::stderr)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .with_writer(io::stderr)
                .boxed()
        };

        let guard = if let Some(ref path) = self.file_path {
            let (directory, file_name) = split_log_path(path)?;
            let file_appender = rolling::never(directory, file_name);
            let (writer, guard) = non_blocking(file_appender);

            let file_layer = fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_writer(writer);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()?;

            Some(guard)
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init()?;

            None
        };

        tracing::debug!(level = %self.level, "logging initialized");

        Ok(guard)
    }
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf), Box<dyn std::error::Error + Send + Sync>> {
    let file_name = path
        .file_name()
        .ok_or_else(|| format!("log file path {:?} has no file name", path))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    Ok((directory, PathBuf::from(file_name)))
}
