use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where and how verbosely to log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset, e.g. `"info"` or `"lensgen=debug"`.
    pub base_level: String,
    /// Directory for the rolling log files. `None` logs to the console only.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
    pub max_log_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            base_level: "info".to_string(),
            directory: Some(PathBuf::from("logs")),
            file_prefix: "lensgen".to_string(),
            max_log_files: 5,
        }
    }
}

impl LogConfig {
    /// Console-only logging at `base_level`.
    pub fn console(base_level: &str) -> Self {
        Self {
            base_level: base_level.to_string(),
            directory: None,
            ..Self::default()
        }
    }
}

/// Install the global subscriber: console output (warnings and errors to
/// stderr) plus an optional daily-rotated file.
///
/// # Panics
/// Panics if the filter is invalid, the log directory cannot be created, or a
/// global subscriber is already installed.
pub fn setup_logging(config: &LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.base_level))
        .unwrap_or_else(|e| panic!("Invalid log filter: {}", e));

    let console_writer = std::io::stdout.and(std::io::stderr.with_min_level(Level::WARN));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true)
        .with_writer(console_writer);

    let file_layer = config.directory.as_ref().map(|directory| {
        std::fs::create_dir_all(directory)
            .unwrap_or_else(|e| panic!("Failed to create logs directory: {}", e));

        let file_appender = tracing_appender::rolling::Builder::new()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix(&config.file_prefix)
            .filename_suffix("log")
            .max_log_files(config.max_log_files)
            .build(directory)
            .unwrap_or_else(|e| panic!("Failed to create log file appender: {}", e));

        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        LOG_GUARD.set(guard).expect("Logging already initialized");

        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false)
            .with_writer(file_writer)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .unwrap_or_else(|e| panic!("Logger initialization failed: {}", e));
}

/// Route tracing output through the test harness. Safe to call repeatedly.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_creates_log_directory() {
        let directory = std::env::temp_dir().join(format!("lensgen-logs-{}", std::process::id()));
        let config = LogConfig {
            base_level: "debug".to_string(),
            directory: Some(directory.clone()),
            file_prefix: "test".to_string(),
            max_log_files: 1,
        };
        setup_logging(&config);
        tracing::warn!("log directory ready");

        assert!(directory.is_dir());
        assert!(LOG_GUARD.get().is_some());
        let _ = std::fs::remove_dir_all(&directory);
    }

    #[test]
    fn test_console_config_has_no_directory() {
        let config = LogConfig::console("warn");
        assert_eq!(config.base_level, "warn");
        assert!(config.directory.is_none());
        assert_eq!(config.file_prefix, "lensgen");
    }
}
