//! # Error Types
//!
//! Domain-specific error types for shoplink-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  shoplink-core errors (this file)                                      │
//! │  ├── CoreError        - Reconciliation failures                        │
//! │  └── ValidationError  - Client input failures (echo the field)         │
//! │                                                                         │
//! │  shoplink-db errors (separate crate)                                   │
//! │  └── DbError          - Store read/write failures                      │
//! │                                                                         │
//! │  relay errors (in app)                                                 │
//! │  └── RelayError       - What the transport sees (status + body)        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → RelayError → device               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Best-effort misses (an unmatched sale line, a missing customer phone) are
//! NOT errors. They surface as counters on the operation's report.

use thiserror::Error;

use crate::sale::ExpiredBlock;

// =============================================================================
// Core Error
// =============================================================================

/// Reconciliation errors.
///
/// Every variant means "nothing was mutated": operations validate and screen
/// before they touch the document.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or invalid client input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A lookup that the caller requires to succeed found nothing.
    ///
    /// ## When This Occurs
    /// - Debtor payment for a receipt/phone with no open balance
    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    /// The current state forbids the requested transition.
    ///
    /// `context` carries key/value pairs that let the caller retry with
    /// corrected input.
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        context: Vec<(String, String)>,
    },

    /// A sale contains expired inventory and was rejected as a whole.
    #[error("Sale blocked: {} expired item(s)", .0.items.len())]
    ExpiredBlock(ExpiredBlock),

    /// A stored row could not be rebuilt after a merge.
    #[error("Invalid {entity} record: {reason}")]
    InvalidRecord { entity: String, reason: String },
}

impl CoreError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Creates a Conflict error without retry context.
    pub fn conflict(message: impl Into<String>) -> Self {
        CoreError::Conflict {
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Creates an InvalidRecord error from a serde failure.
    pub fn invalid_record(entity: impl Into<String>, err: serde_json::Error) -> Self {
        CoreError::InvalidRecord {
            entity: entity.into(),
            reason: err.to_string(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These are raised before any reconciliation step runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Invalid format (payload shape, date, id).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value must be a finite, positive number.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },
}

impl ValidationError {
    /// Creates a Required error.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// The offending field, echoed back to the caller.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::OutOfRange { field, .. } => field,
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
