//! Product expiry dates.
//!
//! Devices store expiry under one of several field names and in one of
//! several formats. Dates are compared as calendar days in the business
//! timezone, never as instants.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::Value;

use crate::types::Product;
use crate::wire::integer;

/// Field names checked on a product, in order.
pub const EXPIRY_FIELDS: [&str; 5] = ["expiryDate", "expiringDate", "expDate", "expiry", "exp"];

/// Where an expiry date falls relative to the business day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryClass {
    /// Strictly before today. Selling is blocked.
    Expired,
    /// Today or within the "soon" window. Selling is allowed with a warning.
    Soon,
    Fresh,
}

/// Parses one expiry value.
///
/// Accepted: `YYYYMMDD`, `YYYY-MM-DD`, epoch milliseconds (number or
/// numeric string of at least 10 digits), RFC 3339, and naive
/// `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_expiry(value: &Value, tz: FixedOffset) -> Option<NaiveDate> {
    match value {
        Value::Number(_) => integer(value).and_then(|ms| date_of_millis(ms, tz)),
        Value::String(s) => parse_text(s.trim(), tz),
        _ => None,
    }
}

fn parse_text(s: &str, tz: FixedOffset) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }
    let all_digits = s.bytes().all(|b| b.is_ascii_digit());

    if all_digits && s.len() == 8 {
        return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if all_digits && s.len() >= 10 {
        return s.parse::<i64>().ok().and_then(|ms| date_of_millis(ms, tz));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&tz).date_naive());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}

fn date_of_millis(ms: i64, tz: FixedOffset) -> Option<NaiveDate> {
    tz.timestamp_millis_opt(ms).single().map(|dt| dt.date_naive())
}

/// First parseable expiry among [`EXPIRY_FIELDS`].
pub fn product_expiry(product: &Product, tz: FixedOffset) -> Option<NaiveDate> {
    EXPIRY_FIELDS
        .iter()
        .filter_map(|field| product.extra.get(*field))
        .find_map(|value| parse_expiry(value, tz))
}

pub fn classify(expiry: NaiveDate, today: NaiveDate, soon_days: i64) -> ExpiryClass {
    if expiry < today {
        ExpiryClass::Expired
    } else if expiry <= today + Duration::days(soon_days) {
        ExpiryClass::Soon
    } else {
        ExpiryClass::Fresh
    }
}

/// `YYYY-MM-DD`, the form expiry dates are reported back in.
pub fn ymd(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wat() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_formats() {
        assert_eq!(parse_expiry(&json!("20250131"), wat()), Some(date(2025, 1, 31)));
        assert_eq!(parse_expiry(&json!("2025-01-31"), wat()), Some(date(2025, 1, 31)));
        assert_eq!(parse_expiry(&json!(" "), wat()), None);
        assert_eq!(parse_expiry(&json!("soon"), wat()), None);
        assert_eq!(parse_expiry(&json!(null), wat()), None);
    }

    #[test]
    fn test_parse_millis_uses_business_timezone() {
        // 2024-12-31T23:30:00Z is already Jan 1st at UTC+1
        let ms = 1_735_687_800_000i64;
        assert_eq!(parse_expiry(&json!(ms), wat()), Some(date(2025, 1, 1)));
        assert_eq!(parse_expiry(&json!(ms.to_string()), wat()), Some(date(2025, 1, 1)));
        assert_eq!(
            parse_expiry(&json!("2024-12-31T23:30:00Z"), wat()),
            Some(date(2025, 1, 1))
        );
    }

    #[test]
    fn test_product_expiry_field_order() {
        let mut product = Product::default();
        product.extra.insert("expiry".into(), json!("2026-05-01"));
        product.extra.insert("expiryDate".into(), json!("not a date"));
        assert_eq!(product_expiry(&product, wat()), Some(date(2026, 5, 1)));
    }

    #[test]
    fn test_classify() {
        let today = date(2025, 6, 1);
        assert_eq!(classify(date(2025, 5, 31), today, 90), ExpiryClass::Expired);
        assert_eq!(classify(today, today, 90), ExpiryClass::Soon);
        assert_eq!(classify(date(2025, 8, 30), today, 90), ExpiryClass::Soon);
        assert_eq!(classify(date(2025, 8, 31), today, 90), ExpiryClass::Fresh);
    }
}
