//! # Wire Tolerance
//!
//! Devices from several app generations push JSON with drifting shapes:
//! numbers as strings, timestamps as RFC 3339 text, ids as numbers. This
//! module is the single place where that variance is absorbed.
//!
//! ## Two Tools
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  accessors (text, number, integer, millis, first_text)                  │
//! │    read a field out of a raw serde_json::Map                            │
//! │                                                                         │
//! │  de::* (serde deserialize_with helpers)                                 │
//! │    let typed rows (Product, Sale, Debtor …) load from the same          │
//! │    loosely typed JSON without ever failing on a field                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::types::Millis;

// =============================================================================
// Accessors
// =============================================================================

/// Renders a scalar as text. `null`, arrays and objects become `""`.
///
/// Integral floats render without a fraction (`5.0` → `"5"`) so ids pushed
/// as numbers compare equal to ids pushed as strings.
pub fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Trimmed text of an optional field.
pub fn field_text(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).map(text).unwrap_or_default().trim().to_string()
}

/// First non-empty trimmed text among `keys`.
pub fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .map(|key| field_text(obj, key))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

/// Finite number from a JSON number or numeric string.
pub fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Integer from a JSON number or numeric string; fractions truncate.
pub fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

/// Epoch milliseconds from an integer, numeric string or RFC 3339 text.
pub fn millis(value: &Value) -> Option<Millis> {
    if let Some(ms) = integer(value) {
        return Some(ms);
    }
    let s = value.as_str()?.trim();
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// First positive timestamp among `keys`.
pub fn first_millis(obj: &Map<String, Value>, keys: &[&str]) -> Option<Millis> {
    keys.iter()
        .filter_map(|key| obj.get(*key).and_then(millis))
        .find(|ms| *ms > 0)
}

/// Name normalization for fuzzy identity: trim, lowercase, collapse
/// whitespace runs to one space.
pub fn norm_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// =============================================================================
// Lenient serde helpers
// =============================================================================

/// `deserialize_with` helpers. None of them fail on a well-formed JSON
/// value; unusable input falls back to the type's default.
pub mod de {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::{integer, number, text};

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(text(&Value::deserialize(d)?))
    }

    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(number(&Value::deserialize(d)?).unwrap_or(0.0))
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(number(&Value::deserialize(d)?))
    }

    pub fn i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(integer(&Value::deserialize(d)?).unwrap_or(0))
    }

    pub fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(integer(&Value::deserialize(d)?))
    }

    pub fn u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        Ok(integer(&Value::deserialize(d)?)
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0))
    }

    pub fn millis<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(super::millis(&Value::deserialize(d)?).unwrap_or(0))
    }

    pub fn bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
            _ => false,
        })
    }

    pub fn values<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Value>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items,
            _ => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_normalizes_numbers() {
        assert_eq!(text(&json!(42)), "42");
        assert_eq!(text(&json!(42.0)), "42");
        assert_eq!(text(&json!(4.5)), "4.5");
        assert_eq!(text(&json!(null)), "");
        assert_eq!(text(&json!(" RCPT-1 ")), " RCPT-1 ");
    }

    #[test]
    fn test_first_text_skips_blanks() {
        let obj = json!({"receiptNo": "  ", "receipt": 17, "invoiceNo": "INV-9"});
        let obj = obj.as_object().unwrap();
        assert_eq!(first_text(obj, &["receiptNo", "receipt", "invoiceNo"]), "17");
    }

    #[test]
    fn test_numbers_from_strings() {
        assert_eq!(number(&json!("1500.50")), Some(1500.5));
        assert_eq!(number(&json!("abc")), None);
        assert_eq!(integer(&json!("12")), Some(12));
        assert_eq!(integer(&json!(3.9)), Some(3));
        assert_eq!(integer(&json!("")), None);
    }

    #[derive(serde::Deserialize)]
    struct Stamped {
        #[serde(default, deserialize_with = "de::millis")]
        at: Millis,
    }

    #[test]
    fn test_de_millis_is_lenient() {
        let row: Stamped = serde_json::from_value(json!({"at": "1700000000000"})).unwrap();
        assert_eq!(row.at, 1_700_000_000_000);
        let row: Stamped = serde_json::from_value(json!({"at": "not a time"})).unwrap();
        assert_eq!(row.at, 0);
    }

    #[test]
    fn test_millis_accepts_rfc3339() {
        assert_eq!(millis(&json!(1_700_000_000_000i64)), Some(1_700_000_000_000));
        assert_eq!(
            millis(&json!("2024-01-01T00:00:00Z")),
            Some(1_704_067_200_000)
        );
        assert_eq!(millis(&json!("yesterday")), None);
    }

    #[test]
    fn test_norm_name() {
        assert_eq!(norm_name("  Golden   Penny\tRice "), "golden penny rice");
    }
}
