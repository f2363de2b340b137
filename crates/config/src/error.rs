//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration or credential file
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or type error
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// A setting holds a value that cannot be used
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// Scrape intervals must be positive
    #[error("{key} must be a positive number of seconds")]
    InvalidInterval { key: &'static str },

    /// Cookie file without the `user:pass` separator
    #[error("malformed cookie file {path}: expected 'user:password'")]
    MalformedCookie { path: PathBuf },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
