//! Common error types for PMX

use thiserror::Error;

/// Common result type for PMX operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across PMX crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML document could not be deserialized
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A timestamp or UTC offset string could not be parsed
    #[error("Invalid timestamp: {0}")]
    Timestamp(String),
}
