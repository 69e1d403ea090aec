//! Unified error system for Quill
//!
//! A single error enum covers every failure the engine can observe, plus a
//! coarse [`ErrorCategory`] used to pick notification severity.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use crate::effects::notify::ToastLevel;

/// Result alias used throughout the workspace.
pub type QuillResult<T> = Result<T, QuillError>;

/// Unified error type for all Quill operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum QuillError {
    /// Request failed or returned no body
    #[error("Transport error: {message}")]
    Transport {
        /// Error message describing the transport failure
        message: String,
    },

    /// Failure while pulling subsequent stream chunks
    #[error("Stream read error: {message}")]
    StreamRead {
        /// Error message describing the read failure
        message: String,
    },

    /// Malformed byte sequence in the response stream
    #[error("Decode error: {message}")]
    Decode {
        /// Error message describing the malformed input
        message: String,
    },

    /// Invalid input
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Configuration could not be loaded or failed validation
    #[error("Config error in '{field}': {message}")]
    Config {
        /// Offending field or source
        field: String,
        /// Error message describing the configuration problem
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl QuillError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a stream read error
    pub fn stream_read(message: impl Into<String>) -> Self {
        Self::StreamRead {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a configuration error for `field`
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error ends a stream mid-flight.
    ///
    /// Decode failures are handled exactly like read failures.
    pub fn is_stream_failure(&self) -> bool {
        matches!(self, Self::StreamRead { .. } | Self::Decode { .. })
    }

    /// Coarse category used for notification routing.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport { .. } | Self::StreamRead { .. } | Self::Decode { .. } => {
                ErrorCategory::Network
            }
            Self::Invalid { .. } => ErrorCategory::Input,
            Self::Config { .. } => ErrorCategory::Config,
            Self::NotFound { .. } | Self::Internal { .. } => ErrorCategory::Operation,
        }
    }
}

// ============================================================================
// Error Categories
// ============================================================================

/// High-level error categories for frontend error handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// User input validation errors (correctable by user)
    Input,
    /// Configuration errors (correctable by modifying settings)
    Config,
    /// Network connectivity errors (often transient)
    Network,
    /// General operation failures (catch-all)
    Operation,
}

impl ErrorCategory {
    /// Check if this error category is user-correctable.
    #[must_use]
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::Input | Self::Config)
    }

    /// Check if this error category is likely transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get the appropriate toast severity for this category.
    #[must_use]
    pub fn toast_severity(&self) -> ToastLevel {
        match self {
            Self::Input => ToastLevel::Info,
            Self::Config => ToastLevel::Warning,
            Self::Network => ToastLevel::Error,
            Self::Operation => ToastLevel::Error,
        }
    }

    /// Get a short label for this category.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Config => "Config",
            Self::Network => "Network",
            Self::Operation => "Operation",
        }
    }

    /// Get a hint for the user on how to resolve this category of error.
    #[must_use]
    pub fn resolution_hint(&self) -> &'static str {
        match self {
            Self::Input => "Check your input and try again",
            Self::Config => "Review your configuration settings",
            Self::Network => "Check your network connection and retry",
            Self::Operation => "An unexpected error occurred",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_failures() {
        assert!(QuillError::stream_read("reset").is_stream_failure());
        assert!(QuillError::decode("bad byte").is_stream_failure());
        assert!(!QuillError::transport("refused").is_stream_failure());
    }

    #[test]
    fn test_transport_family_is_network() {
        for err in [
            QuillError::transport("x"),
            QuillError::stream_read("x"),
            QuillError::decode("x"),
        ] {
            assert_eq!(err.category(), ErrorCategory::Network);
            assert_eq!(err.category().toast_severity(), ToastLevel::Error);
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = QuillError::config("page_size", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "Config error in 'page_size': must be greater than zero"
        );
        assert!(err.category().is_user_correctable());
    }
}
