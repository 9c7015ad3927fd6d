//! # Validation Module
//!
//! Input checks that run before any reconciliation step touches the
//! document.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Wire tolerance (wire.rs)                                      │
//! │  ├── Numbers as strings, ids as numbers                                 │
//! │  └── Never rejects, only normalizes                                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  ├── Required fields (shopId, items[], sale body)                       │
//! │  └── Amount and range rules                                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Natural keys (document.rs)                                    │
//! │  └── One row per (shopId, key)                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error names the offending field so devices can show it.

use serde_json::Value;

use crate::error::ValidationError;
use crate::{MAX_EXPIRY_SOON_DAYS, MIN_EXPIRY_SOON_DAYS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifiers
// =============================================================================

/// Validates a canonical shop id and returns it trimmed.
///
/// ## Example
/// ```rust
/// use shoplink_core::validation::validate_shop_id;
///
/// assert_eq!(validate_shop_id(" SHOP-1 ").unwrap(), "SHOP-1");
/// assert!(validate_shop_id("   ").is_err());
/// ```
pub fn validate_shop_id(shop_id: &str) -> ValidationResult<String> {
    let shop_id = shop_id.trim();
    if shop_id.is_empty() {
        return Err(ValidationError::required("shopId"));
    }
    Ok(shop_id.to_string())
}

/// Validates an alias edge `from → to`.
pub fn validate_alias(from: &str, to: &str) -> ValidationResult<(String, String)> {
    let from = from.trim();
    let to = to.trim();

    if from.is_empty() {
        return Err(ValidationError::required("from"));
    }
    if to.is_empty() {
        return Err(ValidationError::required("to"));
    }
    if from == to {
        return Err(ValidationError::InvalidFormat {
            field: "to".to_string(),
            reason: "must differ from 'from'".to_string(),
        });
    }

    Ok((from.to_string(), to.to_string()))
}

// =============================================================================
// Payloads
// =============================================================================

/// Requires `value` to be an array (the `items[]` of a push).
pub fn require_items<'a>(field: &str, value: Option<&'a Value>) -> ValidationResult<&'a [Value]> {
    match value {
        Some(Value::Array(items)) => Ok(items.as_slice()),
        _ => Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "array required".to_string(),
        }),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a payment amount: finite and strictly positive.
///
/// ```rust
/// use shoplink_core::validation::validate_amount;
///
/// assert_eq!(validate_amount(Some(120.0)).unwrap(), 120.0);
/// assert!(validate_amount(Some(0.0)).is_err());
/// assert!(validate_amount(Some(f64::NAN)).is_err());
/// assert!(validate_amount(None).is_err());
/// ```
pub fn validate_amount(amount: Option<f64>) -> ValidationResult<f64> {
    match amount {
        Some(a) if a.is_finite() && a > 0.0 => Ok(a),
        _ => Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        }),
    }
}

/// Validates a shop's "expiring soon" setting for a profile update.
pub fn validate_expiry_soon_days(days: i64) -> ValidationResult<i64> {
    if !(MIN_EXPIRY_SOON_DAYS..=MAX_EXPIRY_SOON_DAYS).contains(&days) {
        return Err(ValidationError::OutOfRange {
            field: "expirySoonDays".to_string(),
            min: MIN_EXPIRY_SOON_DAYS,
            max: MAX_EXPIRY_SOON_DAYS,
        });
    }
    Ok(days)
}

/// Effective "expiring soon" window: the shop setting when it is in range,
/// otherwise `default_days`.
pub fn soon_window(shop_setting: Option<i64>, default_days: i64) -> i64 {
    shop_setting
        .filter(|days| (MIN_EXPIRY_SOON_DAYS..=MAX_EXPIRY_SOON_DAYS).contains(days))
        .unwrap_or(default_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_alias() {
        assert_eq!(
            validate_alias(" A ", "B").unwrap(),
            ("A".to_string(), "B".to_string())
        );
        assert_eq!(validate_alias("", "B").unwrap_err().field(), "from");
        assert_eq!(validate_alias("A", " A").unwrap_err().field(), "to");
    }

    #[test]
    fn test_require_items() {
        let body = json!({"items": [{"productId": "P1"}], "other": 1});
        assert_eq!(require_items("items", body.get("items")).unwrap().len(), 1);
        assert!(require_items("items", body.get("other")).is_err());
        assert!(require_items("items", body.get("missing")).is_err());
    }

    #[test]
    fn test_soon_window() {
        assert_eq!(soon_window(None, 90), 90);
        assert_eq!(soon_window(Some(30), 90), 30);
        assert_eq!(soon_window(Some(0), 90), 90);
        assert_eq!(soon_window(Some(400), 90), 90);
    }

    #[test]
    fn test_validate_expiry_soon_days() {
        assert!(validate_expiry_soon_days(365).is_ok());
        assert!(matches!(
            validate_expiry_soon_days(366),
            Err(ValidationError::OutOfRange { .. })
        ));
    }
}
