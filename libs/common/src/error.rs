//! Custom error types for the common library
//!
//! This module defines the errors raised while assembling the service
//! configuration.

use config::ConfigError as SourceError;
use thiserror::Error;

/// Custom error type for configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration source could not be read or deserialized
    #[error("Configuration load error: {0}")]
    Load(#[from] SourceError),

    /// A value was read but is not usable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Type alias for Result with ConfigError
pub type ConfigResult<T> = Result<T, ConfigError>;
