use serde::{Deserialize, Serialize};

/// Machine-readable error category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Authentication,
    RateLimitExceeded,
    Validation,
    NotFound,
    Conflict,
    Internal,
}

/// A single violated constraint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error body returned for every rejected request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,

    /// Epoch milliseconds at which a rate-limited caller may retry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<u64>,
}

impl ErrorBody {
    pub fn new(error: ErrorKind, message: &str) -> Self {
        Self {
            error,
            message: message.to_string(),
            fields: Vec::new(),
            reset_at: None,
        }
    }

    pub fn authentication(message: &str) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn rate_limited(reset_at: u64) -> Self {
        Self {
            reset_at: Some(reset_at),
            ..Self::new(
                ErrorKind::RateLimitExceeded,
                "Rate limit exceeded. Please try again later.",
            )
        }
    }

    pub fn validation(message: &str, fields: Vec<FieldError>) -> Self {
        Self {
            fields,
            ..Self::new(ErrorKind::Validation, message)
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: &str) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Generic body for unexpected failures; never carries internal detail
    pub fn internal() -> Self {
        Self::new(ErrorKind::Internal, "Internal server error")
    }
}
