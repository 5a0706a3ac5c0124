//! Configuration error taxonomy.
//!
//! Every variant is fatal: the bridge refuses to connect to the broker when
//! its configuration cannot be loaded or fails validation.

use thiserror::Error;

/// Result type alias using `ConfigError`.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating the bridge configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {path}")]
    MissingFile {
        /// Path that was looked up
        path: String,
    },

    /// The configuration sources could not be parsed or merged.
    #[error("failed to load configuration: {0}")]
    Load(#[source] Box<figment::Error>),

    /// A configuration value is missing or out of range.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// Description of the offending value
        message: String,
    },

    /// A URL in the configuration could not be parsed or has the wrong scheme.
    #[error("invalid URL for {field}: {message}")]
    InvalidUrl {
        /// Configuration key holding the URL
        field: String,
        /// Parse failure description
        message: String,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }

    /// Creates an invalid URL error for the given field.
    pub fn invalid_url(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl { field: field.into(), message: message.into() }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}
