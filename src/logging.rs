//! Locator Bridge Logging System
//!
//! Provides structured logging with configurable levels and output formats.
//! Uses tracing crate for structured logging with spans and events.

use std::io::{self, IsTerminal};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level to output
    pub level: Level,
    /// Enable colored output
    pub color: bool,
    /// Show timestamps
    pub show_timestamps: bool,
    /// Show target/module name
    pub show_target: bool,
    /// Enable JSON format for machine parsing
    pub json_format: bool,
    /// Enable span events for tracing
    pub enable_spans: bool,
    /// Output to a daily rolling file instead of stdout
    pub file_output: Option<std::path::PathBuf>,
}

impl LoggingConfig {
    /// Detached bridge writing to a log file
    pub fn for_server() -> Self {
        Self {
            level: Level::INFO,
            color: false,
            show_timestamps: true,
            show_target: true,
            json_format: false,
            enable_spans: true,
            file_output: None,
        }
    }

    /// Create config from CLI arguments
    pub fn from_args(quiet: bool, verbose: bool, json: bool) -> Self {
        let level = if verbose {
            Level::DEBUG
        } else if quiet {
            Level::ERROR
        } else {
            Level::INFO
        };

        Self {
            level,
            color: !quiet && !json && io::stdout().is_terminal(),
            show_timestamps: true,
            show_target: verbose,
            json_format: json,
            enable_spans: verbose,
            file_output: None,
        }
    }
}

fn default_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "locator_bridge={level},tower_http={level},rumqttc=warn"
        ))
    })
}

/// Initialize the logging system
pub fn init_logging(config: LoggingConfig) -> io::Result<()> {
    let registry = Registry::default().with(default_filter(config.level));

    if let Some(log_file) = config.file_output {
        let file_appender = tracing_appender::rolling::daily(
            log_file.parent().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file path")
            })?,
            log_file.file_name().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file name")
            })?,
        );

        if config.json_format {
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(config.enable_spans)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(file_appender);
            json_layer.with_subscriber(registry).init();
        } else {
            let fmt_layer = fmt::layer()
                .with_target(config.show_target)
                .with_level(true)
                .with_ansi(false)
                .with_writer(file_appender);

            if config.show_timestamps {
                fmt_layer
                    .with_timer(fmt::time::ChronoUtc::rfc_3339())
                    .with_subscriber(registry)
                    .init();
            } else {
                fmt_layer.with_subscriber(registry).init();
            }
        }
    } else if config.json_format {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(config.enable_spans)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(io::stdout);
        json_layer.with_subscriber(registry).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_target(config.show_target)
            .with_level(true)
            .with_ansi(config.color)
            .with_writer(io::stdout);

        if config.show_timestamps {
            fmt_layer
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_subscriber(registry)
                .init();
        } else {
            fmt_layer.with_subscriber(registry).init();
        }
    }

    Ok(())
}

/// Clean up old log files based on retention policy
///
/// Only removes rotated files, i.e. names containing `.log.` followed by a
/// date suffix (`bridge.log.2025-11-22`). The live file is never touched.
///
/// # Example
/// ```no_run
/// use std::path::Path;
/// use locator_bridge::logging::cleanup_old_logs;
///
/// let log_dir = Path::new("/home/user/.locator-bridge/logs");
/// cleanup_old_logs(log_dir, 7).ok();
/// ```
pub fn cleanup_old_logs(log_dir: &std::path::Path, retention_days: u32) -> io::Result<usize> {
    use std::fs;
    use std::time::SystemTime;

    if !log_dir.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let retention_duration = std::time::Duration::from_secs(retention_days as u64 * 24 * 60 * 60);

    let mut cleaned_count = 0;
    let mut cleaned_size: u64 = 0;

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        let path_str = path.to_string_lossy();
        if !path_str.contains(".log.") || !path.is_file() {
            continue;
        }

        let metadata = entry.metadata()?;
        let modified = metadata.modified()?;

        if let Ok(age) = now.duration_since(modified) {
            if age > retention_duration {
                let size = metadata.len();
                match fs::remove_file(&path) {
                    Ok(_) => {
                        cleaned_count += 1;
                        cleaned_size += size;
                        tracing::info!(
                            "Cleaned up old log file: {} (age: {} days, size: {} bytes)",
                            path.display(),
                            age.as_secs() / 86400,
                            size
                        );
                    },
                    Err(e) => {
                        tracing::warn!("Failed to remove old log file {}: {}", path.display(), e);
                    },
                }
            }
        }
    }

    if cleaned_count > 0 {
        tracing::info!(
            "Log cleanup completed: removed {} files, freed {} bytes",
            cleaned_count,
            cleaned_size
        );
    }

    Ok(cleaned_count)
}

/// Directory holding the bridge's log files
pub fn log_dir() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|home| home.join(".locator-bridge").join("logs"))
}

/// Live log file of the bridge server, creating its directory
pub fn log_file_path() -> io::Result<std::path::PathBuf> {
    let log_dir = log_dir().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "Failed to get home directory")
    })?;
    std::fs::create_dir_all(&log_dir)?;
    Ok(log_dir.join("bridge.log"))
}

#[macro_export]
macro_rules! log_registry_operation {
    ($operation:expr, $count:expr) => {
        tracing::debug!(
            operation = $operation,
            locator_count = $count,
            "Registry operation"
        );
    };
}

#[macro_export]
macro_rules! log_locator_operation {
    ($operation:expr, $locator_id:expr) => {
        tracing::info!(
            operation = $operation,
            locator_id = %$locator_id,
            "Locator operation"
        );
    };
    ($operation:expr, $locator_id:expr, $details:expr) => {
        tracing::info!(
            operation = $operation,
            locator_id = %$locator_id,
            details = %$details,
            "Locator operation"
        );
    };
}

/// Utility macro for structured error logging
#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Operation failed"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_args_levels() {
        assert_eq!(LoggingConfig::from_args(false, true, false).level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_args(true, false, false).level, Level::ERROR);
        assert_eq!(LoggingConfig::from_args(false, false, false).level, Level::INFO);
    }

    #[test]
    fn test_json_disables_color() {
        let config = LoggingConfig::from_args(false, false, true);
        assert!(config.json_format);
        assert!(!config.color);
    }

    #[test]
    fn test_server_config_has_timestamps() {
        let config = LoggingConfig::for_server();
        assert!(config.show_timestamps);
        assert!(!config.color);
    }

    #[test]
    fn test_cleanup_missing_dir_is_noop() {
        let removed =
            cleanup_old_logs(std::path::Path::new("/nonexistent/locator-bridge/logs"), 7).unwrap();
        assert_eq!(removed, 0);
    }
}
