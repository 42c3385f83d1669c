//! Error types for Fieldsnap

use thiserror::Error;

/// Result type alias for Fieldsnap operations
pub type Result<T> = std::result::Result<T, FieldsnapError>;

/// Main error type for Fieldsnap
#[derive(Error, Debug)]
pub enum FieldsnapError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
}

impl FieldsnapError {
    pub fn config(message: impl Into<String>) -> Self {
        FieldsnapError::Config(message.into())
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        FieldsnapError::Validation {
            field,
            reason: reason.into(),
        }
    }
}
