//! # Money Module
//!
//! Amount arithmetic for sale totals and debtor balances.
//!
//! ## Why Floats Here?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DEVICES SEND DECIMAL NAIRA                                             │
//! │                                                                         │
//! │  Every device on the wire reports `total`, `paid`, `price` as plain     │
//! │  JSON numbers (often with kobo fractions). The relay keeps them as      │
//! │  f64 and makes every comparison tolerant:                               │
//! │                                                                         │
//! │    settled   ⇔  balance <= EPSILON                                     │
//! │    same price ⇔ |a - b| < EPSILON                                      │
//! │                                                                         │
//! │  Stored ledger amounts are rounded to 2 decimals after each change so   │
//! │  drift never accumulates across payments.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

/// Tolerance for amount comparisons.
pub const EPSILON: f64 = 0.0001;

/// Rounds an amount to 2 decimal places.
///
/// ```rust
/// use shoplink_core::money::round2;
///
/// assert_eq!(round2(12.3456), 12.35);
/// assert_eq!(round2(3.333333), 3.33);
/// ```
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Amount still owed: `max(0, total - paid)`.
#[inline]
pub fn outstanding(total: f64, paid: f64) -> f64 {
    (total - paid).max(0.0)
}

/// A balance at or below the tolerance counts as fully paid.
#[inline]
pub fn is_settled(balance: f64) -> bool {
    balance <= EPSILON
}

/// Price equality within tolerance.
#[inline]
pub fn same_amount(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// Treats NaN/inf as zero.
#[inline]
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
