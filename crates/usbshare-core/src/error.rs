//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone)]
pub enum DomainError {
    /// Required field was missing or empty
    #[error("Missing {field}")]
    MissingField { field: String },

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

impl DomainError {
    pub fn missing(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Validates a device (bus) id supplied by a caller.
///
/// Bus ids are passed to the tool as `--busid=<id>`; they must be
/// non-empty and contain no whitespace.
pub fn validate_device_id(device_id: &str) -> DomainResult<&str> {
    if device_id.trim().is_empty() {
        return Err(DomainError::missing("deviceId"));
    }
    if device_id.chars().any(char::is_whitespace) {
        return Err(DomainError::InvalidFieldValue {
            field: "deviceId".to_string(),
            value: device_id.to_string(),
            expected: "a bus id without whitespace".to_string(),
        });
    }
    Ok(device_id)
}
