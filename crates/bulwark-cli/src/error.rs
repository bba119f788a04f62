//! Error types and handling for the CLI
//!
//! Each failure mode maps to a distinct process exit code so scripts can
//! tell a rejected session from an unreachable server.

use bulwark_core::{ErrorKind, RequestError};
use std::io;
use std::path::PathBuf;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for CLI operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error from bulwark-core
    #[error("Core error: {0}")]
    Core(#[from] bulwark_core::Error),

    /// A classified request failure
    #[error("Request failed: {0}")]
    Request(#[from] RequestError),

    /// File not found
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Invalid file format
    #[error("Invalid file format for {}: expected {} format", path.display(), expected)]
    InvalidFormat { path: PathBuf, expected: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument combination
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error with context
    #[error("{message}")]
    Other { message: String },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArgs(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) => 1,
            Self::Core(_) => 2,
            Self::FileNotFound { .. } => 3,
            Self::InvalidFormat { .. } => 4,
            Self::Config(_) => 5,
            Self::InvalidArgs(_) => 6,
            Self::Request(e) => match e.kind {
                ErrorKind::Validation => 6,
                ErrorKind::Auth => 20,
                ErrorKind::Permission => 21,
                ErrorKind::Client => 22,
                ErrorKind::Network => 23,
                ErrorKind::Server => 24,
                ErrorKind::Cancelled => 130,
            },
            Self::Json(_) => 12,
            Self::Toml(_) => 13,
            Self::Other { .. } => 99,
        }
    }

    /// Check if this error should display usage help
    pub fn should_show_help(&self) -> bool {
        matches!(self, Self::InvalidArgs(_))
    }
}

/// Format an error for display to the user
pub fn format_error(error: &Error, use_color: bool) -> String {
    let hint = match error {
        Error::Request(e) if e.kind == ErrorKind::Auth => {
            Some("Pass a fresh token with --token or BULWARK_TOKEN")
        }
        Error::Request(e) if e.kind == ErrorKind::Network => {
            Some("Check the base URL and that the server is reachable")
        }
        _ => None,
    };

    let mut message = if use_color {
        use colored::Colorize;
        format!("{} {}", "Error:".red().bold(), error)
    } else {
        format!("Error: {}", error)
    };

    if let Some(hint) = hint {
        message.push_str(&format!("\n  hint: {}", hint));
    }
    message
}
