//! Error types for CleanBook.
//!
//! Library crates use [`CleanbookError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all CleanBook operations.
#[derive(Debug, thiserror::Error)]
pub enum CleanbookError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during health checks, title fetches or LLM calls.
    #[error("network error: {0}")]
    Network(String),

    /// Bookmark file or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad rule, invalid URL, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// LLM API or response error.
    #[error("llm error: {0}")]
    Llm(String),

    /// Rendering or writing an export format failed.
    #[error("export error: {0}")]
    Export(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CleanbookError>;

impl CleanbookError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CleanbookError::config("missing rules file");
        assert_eq!(err.to_string(), "config error: missing rules file");

        let err = CleanbookError::validation("weight must be positive");
        assert!(err.to_string().contains("weight must be positive"));

        let err = CleanbookError::io(
            "/tmp/bookmarks.html",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("bookmarks.html"));
    }
}
