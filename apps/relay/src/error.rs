//! # Relay Error Type
//!
//! What a device sees when a request fails.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ValidationError ──► CoreError ──┐                                      │
//! │                                  ├──► RelayError ──► status + JSON body │
//! │  DbError ────────────────────────┘                                      │
//! │                                                                         │
//! │  400 INVALID_REQUEST   missing/invalid field (echoed as `field`)        │
//! │  404 NOT_FOUND         nothing open for a debtor payment                │
//! │  409 CONFLICT          alias cycle, stale document revision             │
//! │  409 EXPIRED_BLOCK     sale contains expired stock                      │
//! │  500 STORAGE_ERROR     store unreadable/unwritable                      │
//! │  500 INTERNAL                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bodies follow the device wire format:
//! ```json
//! { "ok": false, "error": "amount must be positive", "code": "INVALID_REQUEST", "field": "amount" }
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use shoplink_core::{CoreError, ExpiredBlock, ValidationError};
use shoplink_db::DbError;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    NotFound,
    Conflict,
    ExpiredBlock,
    StorageError,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::ExpiredBlock => "EXPIRED_BLOCK",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Relay errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{message}")]
    InvalidRequest {
        message: String,
        field: Option<String>,
    },

    #[error("{0}")]
    NotFound(String),

    /// `context` is echoed in the body so the caller can correct and retry.
    #[error("{message}")]
    Conflict {
        message: String,
        context: Vec<(String, String)>,
    },

    #[error("{}", .0.message_en)]
    Blocked(ExpiredBlock),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RelayError::InvalidRequest {
            message: message.into(),
            field: None,
        }
    }

    /// `"<field> required"`, the wording devices already match on.
    pub fn required(field: &str) -> Self {
        RelayError::InvalidRequest {
            message: format!("{field} required"),
            field: Some(field.to_string()),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            RelayError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            RelayError::NotFound(_) => ErrorCode::NotFound,
            RelayError::Conflict { .. } => ErrorCode::Conflict,
            RelayError::Blocked(_) => ErrorCode::ExpiredBlock,
            RelayError::Storage(_) => ErrorCode::StorageError,
            RelayError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// HTTP-class status a transport may use.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::InvalidRequest { .. } => 400,
            RelayError::NotFound(_) => 404,
            RelayError::Conflict { .. } | RelayError::Blocked(_) => 409,
            RelayError::Storage(_) | RelayError::Internal(_) => 500,
        }
    }

    /// The JSON error body.
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("ok".into(), Value::Bool(false));
        body.insert("error".into(), Value::String(self.to_string()));
        body.insert("code".into(), Value::String(self.code().as_str().to_string()));

        match self {
            RelayError::InvalidRequest { field: Some(field), .. } => {
                body.insert("field".into(), Value::String(field.clone()));
            }
            RelayError::Conflict { context, .. } => {
                for (key, value) in context {
                    body.insert(key.clone(), Value::String(value.clone()));
                }
            }
            RelayError::Blocked(block) => {
                if let Ok(Value::Object(fields)) = serde_json::to_value(block) {
                    body.extend(fields);
                }
            }
            _ => {}
        }

        Value::Object(body)
    }
}

impl From<CoreError> for RelayError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(validation) => RelayError::InvalidRequest {
                field: Some(validation.field().to_string()),
                message: validation.to_string(),
            },
            CoreError::NotFound { .. } => RelayError::NotFound(err.to_string()),
            CoreError::Conflict { message, context } => RelayError::Conflict { message, context },
            CoreError::ExpiredBlock(block) => RelayError::Blocked(block),
            CoreError::InvalidRecord { .. } => {
                tracing::error!(error = %err, "Stored record could not be rebuilt");
                RelayError::Internal(err.to_string())
            }
        }
    }
}

impl From<ValidationError> for RelayError {
    fn from(err: ValidationError) -> Self {
        RelayError::from(CoreError::Validation(err))
    }
}

impl From<DbError> for RelayError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::RevisionConflict { expected, found } => RelayError::Conflict {
                message: "Shop data changed while saving, retry the request".to_string(),
                context: vec![
                    ("expectedRevision".to_string(), expected.to_string()),
                    ("currentRevision".to_string(), found.to_string()),
                ],
            },
            other => {
                tracing::error!(error = %other, "Store operation failed");
                RelayError::Storage(other.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Internal(err.to_string())
    }
}
