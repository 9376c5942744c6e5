//! Error types for the data layer.

use std::fmt;

/// Data layer errors.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Misconfigured table, identifier or row binding. Always fatal for the caller.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Statement preparation or execution failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A structured column could not be encoded or decoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Cache backend failure.
    #[error("cache error: {message}")]
    Cache { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A validation rule rejected the input.
    #[error("validation failed: {0}")]
    Validation(ValidationError),
}

impl DataError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::Validation(_) => 1,
            Self::Database(_) | Self::Encode(_) | Self::Cache { .. } | Self::Io(_) => 1,
        }
    }
}

impl From<ValidationError> for DataError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

/// A failed validation rule, keyed by the rule name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub rule: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Result type for data layer operations.
pub type DataResult<T> = Result<T, DataError>;
