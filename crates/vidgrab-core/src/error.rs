//! Error types for Vidgrab core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Filesystem failures that carry the offending path.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// Failed to read a file or directory.
    #[error("Failed to read {path}: {reason}")]
    ReadFailed {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Failed to write a file.
    #[error("Failed to write {path}: {reason}")]
    WriteFailed {
        /// Path that could not be written.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Failed to create a directory.
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },
}

/// Errors that can occur in Vidgrab core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required external tool is not configured or does not exist.
    #[error("{tool} is not available (looked for {path})")]
    MissingDependency {
        /// Tool name, e.g. `yt-dlp`.
        tool: String,
        /// Path that was checked.
        path: PathBuf,
    },

    /// The external process could not be started.
    #[error("Failed to start {tool}: {reason}")]
    ToolInvocation {
        /// Tool name.
        tool: String,
        /// Spawn failure reason.
        reason: String,
    },

    /// The external process ran but exited unsuccessfully.
    #[error("{tool} exited with code {exit_code}: {}", summarize_stderr(.stderr))]
    ToolExit {
        /// Tool name.
        tool: String,
        /// Exit code, `-1` when the process was terminated by a signal.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// Metadata output was missing or could not be parsed.
    #[error("Failed to read video metadata: {0}")]
    MetadataParse(String),

    /// Invalid configuration (proxy parameters, settings, options).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// File system operation failed.
    #[error("File system error: {0}")]
    FileSystem(#[from] FileSystemError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse error category, for callers that branch on the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::MissingDependency`].
    MissingDependency,
    /// See [`Error::ToolInvocation`].
    ToolInvocation,
    /// See [`Error::ToolExit`].
    ToolExit,
    /// See [`Error::MetadataParse`].
    MetadataParse,
    /// See [`Error::Config`].
    Config,
    /// See [`Error::Cancelled`].
    Cancelled,
    /// Filesystem, IO and serialization failures.
    Io,
}

impl Error {
    /// Get the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingDependency { .. } => ErrorKind::MissingDependency,
            Self::ToolInvocation { .. } => ErrorKind::ToolInvocation,
            Self::ToolExit { .. } => ErrorKind::ToolExit,
            Self::MetadataParse(_) => ErrorKind::MetadataParse,
            Self::Config(_) => ErrorKind::Config,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::FileSystem(_) | Self::Io(_) | Self::Serialization(_) => ErrorKind::Io,
        }
    }

    /// Whether this error represents a cooperative cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Reduce captured stderr to its last non-empty line for display.
fn summarize_stderr(stderr: &str) -> &str {
    stderr
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .unwrap_or("no error output")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_exit_display_uses_last_stderr_line() {
        let err = Error::ToolExit {
            tool: "yt-dlp".to_string(),
            exit_code: 1,
            stderr: "WARNING: something\nERROR: Video unavailable\n\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "yt-dlp exited with code 1: ERROR: Video unavailable"
        );
    }

    #[test]
    fn test_tool_exit_display_without_stderr() {
        let err = Error::ToolExit {
            tool: "ffmpeg".to_string(),
            exit_code: -1,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "ffmpeg exited with code -1: no error output");
    }

    #[test]
    fn test_missing_dependency_display() {
        let err = Error::MissingDependency {
            tool: "ffmpeg".to_string(),
            path: PathBuf::from("/opt/tools/ffmpeg"),
        };
        assert!(err.to_string().contains("ffmpeg is not available"));
        assert!(err.to_string().contains("/opt/tools/ffmpeg"));
    }

    #[test]
    fn test_kind_and_cancelled() {
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert!(Error::Cancelled.is_cancelled());
        assert_eq!(
            Error::Config("bad".to_string()).kind(),
            ErrorKind::Config
        );
        assert!(!Error::MetadataParse("x".to_string()).is_cancelled());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
