#![forbid(unsafe_code)]

//! Common error type for agg80211 crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O related failures.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing failures.
    #[error("Config parse error: {0}")]
    ConfigParse(toml::de::Error),

    /// Filesystem watch errors.
    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    /// Configuration parsed but failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A MAC address string could not be parsed.
    #[error("Invalid MAC address: {0}")]
    InvalidAddress(String),
}

/// Convenient alias for results throughout agg80211 crates.
pub type CoreResult<T> = Result<T, CoreError>;
