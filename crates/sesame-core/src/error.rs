//! Error types for sesame core.

use std::path::PathBuf;
use thiserror::Error;

/// Core result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for sesame core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Attribute validation errors.
///
/// These are always raised locally, before anything is sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Attribute '{name}' is not defined by schema '{schema}'")]
    UndefinedAttribute { schema: String, name: String },

    #[error("Attribute '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Attribute '{name}' has malformed wire value '{value}' for type {expected}")]
    MalformedWireValue {
        name: String,
        value: String,
        expected: &'static str,
    },

    #[error("Schema attribute '{found}' does not match schema '{expected}'")]
    MismatchedSchema { expected: String, found: String },

    #[error("Schema '{0}' requires at least one attribute to match on")]
    EmptyTable(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

impl ValidationError {
    /// Name of the attribute this error refers to, if any.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Self::UndefinedAttribute { name, .. }
            | Self::TypeMismatch { name, .. }
            | Self::MalformedWireValue { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON5 parse error: {0}")]
    Json5(String),

    #[error("Invalid service address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_attribute_name() {
        let err = ValidationError::TypeMismatch {
            name: "number".to_string(),
            expected: "integer",
            found: "string",
        };
        assert_eq!(err.attribute(), Some("number"));
        assert!(ValidationError::EmptyTable("s".into()).attribute().is_none());
    }

    #[test]
    fn test_validation_error_wraps_into_core_error() {
        let err: Error = ValidationError::EmptyTable("org.example".into()).into();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyTable(_))));
        assert!(err.to_string().contains("org.example"));
    }
}
