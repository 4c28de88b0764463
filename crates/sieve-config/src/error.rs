//! Configuration error types

use thiserror::Error;

/// Errors raised while parsing the endpoint DSL or normalizing a config
///
/// Configuration errors are never recoverable: they fail the filter during
/// `SettingUp` and the launcher treats them as a startup failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Endpoint string failed to tokenize
    #[error("malformed endpoint at position {pos}: {reason}")]
    MalformedEndpoint { pos: usize, reason: String },

    /// Topic name violates `[A-Za-z_][A-Za-z0-9_]*`
    #[error("invalid topic name '{name}'")]
    BadTopic { name: String },

    /// A recognized endpoint option carried a value of the wrong type
    #[error("invalid endpoint option '{key}': {reason}")]
    InvalidOption { key: String, reason: String },

    /// A config field failed validation or coercion
    #[error("invalid config field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// Unknown key in strict mode
    #[error("unknown config field '{field}'")]
    UnknownField { field: String },
}

impl ConfigError {
    /// Create a MalformedEndpoint error
    pub fn malformed(pos: usize, reason: impl Into<String>) -> Self {
        Self::MalformedEndpoint {
            pos,
            reason: reason.into(),
        }
    }

    /// Create an InvalidField error
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidOption error
    pub fn invalid_option(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether the pipeline continues after this error (it never does)
    pub fn recoverable(&self) -> bool {
        false
    }
}
