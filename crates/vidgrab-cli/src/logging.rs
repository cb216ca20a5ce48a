//! Structured logging for the `vidgrab` binary.
//!
//! Two layers share one registry:
//! - Console output on stderr, so progress lines on stdout stay readable
//! - JSON file output through a rolling, non-blocking appender
//!
//! `RUST_LOG` overrides the console filter.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::ParseError,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const LOG_FILE_PREFIX: &str = "vidgrab";
const LOG_FILE_SUFFIX: &str = "log";
const CRATE_TARGETS: [&str; 2] = ["vidgrab", "vidgrab_core"];

/// Logging configuration options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory where log files are stored.
    pub log_directory: PathBuf,
    /// Log file name prefix ("vidgrab" -> "vidgrab.2026-01-15.log").
    pub log_file_prefix: String,
    /// Maximum level of our own crates on the console.
    pub console_level: Level,
    /// Maximum level of our own crates in the log file.
    pub file_level: Level,
    /// How often to rotate log files.
    pub rotation: LogRotation,
    /// Number of rotated files to keep (0 = keep all).
    pub max_log_files: usize,
    /// Whether to include ANSI color codes in console output.
    pub console_ansi: bool,
    /// Whether to include file/line info in console output.
    pub include_file_line: bool,
    /// Whether to include the target module in console output.
    pub include_target: bool,
    /// Whether to log span open/close events.
    pub log_span_events: bool,
}

/// Log rotation frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    /// New file every hour.
    Hourly,
    /// New file every day.
    Daily,
    /// Single file.
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Hourly => Self::HOURLY,
            LogRotation::Daily => Self::DAILY,
            LogRotation::Never => Self::NEVER,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LoggingConfig {
    /// Verbose configuration selected by `--verbose`.
    #[must_use]
    pub fn development() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_file_prefix: LOG_FILE_PREFIX.to_string(),
            console_level: Level::DEBUG,
            file_level: Level::TRACE,
            rotation: LogRotation::Hourly,
            max_log_files: 24,
            console_ansi: true,
            include_file_line: true,
            include_target: true,
            log_span_events: true,
        }
    }

    /// Quiet console, detailed file.
    #[must_use]
    pub fn production() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_file_prefix: LOG_FILE_PREFIX.to_string(),
            console_level: Level::WARN,
            file_level: Level::DEBUG,
            rotation: LogRotation::Daily,
            max_log_files: 7,
            console_ansi: true,
            include_file_line: false,
            include_target: false,
            log_span_events: false,
        }
    }

    /// Pick the preset for the `--verbose` flag.
    #[must_use]
    pub fn for_verbosity(verbose: bool) -> Self {
        if verbose {
            Self::development()
        } else {
            Self::production()
        }
    }

    /// Set the log directory.
    #[must_use]
    pub fn with_log_directory(mut self, path: PathBuf) -> Self {
        self.log_directory = path;
        self
    }
}

/// Keeps file logging alive. Dropping it flushes pending entries.
pub struct LoggingGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created, the appender
/// cannot be opened, a filter directive is invalid, or a subscriber is
/// already installed.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    if !config.log_directory.exists() {
        std::fs::create_dir_all(&config.log_directory).map_err(|e| {
            LoggingError::DirectoryCreationFailed {
                path: config.log_directory.clone(),
                reason: e.to_string(),
            }
        })?;
    }

    let file_appender = RollingFileAppender::builder()
        .rotation(config.rotation.into())
        .filename_prefix(&config.log_file_prefix)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(config.max_log_files.max(1))
        .build(&config.log_directory)
        .map_err(|e| LoggingError::AppenderFailed(e.to_string()))?;
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => crate_filter(Level::WARN, config.console_level)?,
    };
    let file_filter = crate_filter(Level::INFO, config.file_level)?;

    let span_events = if config.log_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.console_ansi)
        .with_target(config.include_target)
        .with_file(config.include_file_line)
        .with_line_number(config.include_file_line)
        .with_span_events(span_events.clone())
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .json()
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// `<data_local_dir>/vidgrab/logs`.
#[must_use]
pub fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(LOG_FILE_PREFIX)
        .join("logs")
}

/// Dependencies at `base`, our crates at `ours`.
fn crate_filter(base: Level, ours: Level) -> Result<EnvFilter, LoggingError> {
    let mut filter = EnvFilter::new(level_to_directive(base));
    for target in CRATE_TARGETS {
        filter = filter.add_directive(format!("{target}={}", level_to_directive(ours)).parse()?);
    }
    Ok(filter)
}

const fn level_to_directive(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to create the log directory.
    #[error("Failed to create log directory {path}: {reason}")]
    DirectoryCreationFailed {
        /// The path that could not be created.
        path: PathBuf,
        /// The reason for the failure.
        reason: String,
    },

    /// The rolling file appender could not be opened.
    #[error("Failed to open log file: {0}")]
    AppenderFailed(String),

    /// A filter directive did not parse.
    #[error("Invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),

    /// Another global subscriber is already installed.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}
