//! Configuration error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Explicitly requested configuration file is absent
    #[error("Configuration file not found: {path}")]
    ConfigFileNotFound { path: String },

    /// Source could not be read or merged
    #[error("Failed to load configuration: {error}")]
    LoadError { error: String },

    /// Merged sources did not deserialize into the expected shape
    #[error("Invalid configuration structure: {error}")]
    DeserializationError { error: String },

    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    #[error("Configuration validation failed: {error}")]
    ValidationError { error: String },
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }

    pub fn validation_error(error: impl Into<String>) -> Self {
        Self::ValidationError {
            error: error.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        match error {
            config::ConfigError::Type { .. } | config::ConfigError::Message(_) => {
                Self::DeserializationError {
                    error: error.to_string(),
                }
            }
            other => Self::LoadError {
                error: other.to_string(),
            },
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
