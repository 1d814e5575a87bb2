//! Uniform outcome of backend calls.
//!
//! Expected failures of the sharing tool (timeouts, non-zero exits, a
//! missing executable) are values, never panics. `ErrorCode::None` is
//! reported if and only if the call succeeded.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a backend failure, ordered by specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorCode {
    /// No error
    #[default]
    None,

    /// The call exceeded its deadline or was cancelled (retryable)
    Timeout,

    /// The tool ran and reported failure, or could not be started
    ProcessFailed,

    /// Privilege or driver-installation problem (tool exit code 5)
    Unauthorized,

    /// The tool executable could not be located
    ToolNotFound,

    /// Malformed structured output (reserved; the listing parser is lenient)
    ParseError,

    /// Unclassified
    Unknown,
}

impl ErrorCode {
    /// Returns true if retrying without operator action can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::ProcessFailed)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::Timeout => "Timeout",
            Self::ProcessFailed => "ProcessFailed",
            Self::Unauthorized => "Unauthorized",
            Self::ToolNotFound => "ToolNotFound",
            Self::ParseError => "ParseError",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// A failed backend call: the error code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct BackendFailure {
    pub code: ErrorCode,
    pub message: String,
}

impl BackendFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Outcome of a backend-mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendResult {
    success: bool,
    error_code: ErrorCode,
    message: Option<String>,
}

impl BackendResult {
    /// A successful call.
    pub fn ok() -> Self {
        Self {
            success: true,
            error_code: ErrorCode::None,
            message: None,
        }
    }

    /// A failed call.
    ///
    /// `ErrorCode::None` is not a failure classification and is mapped to
    /// `ErrorCode::Unknown`.
    pub fn failed(code: ErrorCode, message: impl Into<String>) -> Self {
        let code = match code {
            ErrorCode::None => ErrorCode::Unknown,
            other => other,
        };
        Self {
            success: false,
            error_code: code,
            message: Some(message.into()),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Converts into a `Result` so callers can use `?`.
    pub fn into_result(self) -> Result<(), BackendFailure> {
        if self.success {
            Ok(())
        } else {
            Err(BackendFailure {
                code: self.error_code,
                message: self.message.unwrap_or_default(),
            })
        }
    }
}

impl From<BackendFailure> for BackendResult {
    fn from(failure: BackendFailure) -> Self {
        Self::failed(failure.code, failure.message)
    }
}

impl From<Result<(), BackendFailure>> for BackendResult {
    fn from(result: Result<(), BackendFailure>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(failure) => failure.into(),
        }
    }
}

/// Reachability of the sharing tool and its driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStatus {
    pub installed: bool,
    pub message: String,
    pub error_code: ErrorCode,
}

impl DriverStatus {
    pub fn reachable() -> Self {
        Self {
            installed: true,
            message: "reachable".to_string(),
            error_code: ErrorCode::None,
        }
    }

    pub fn unreachable(failure: BackendFailure) -> Self {
        Self {
            installed: false,
            message: failure.message,
            error_code: failure.code,
        }
    }
}
