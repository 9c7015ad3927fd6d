//! # Domain Types
//!
//! Rows of the shared shop dataset, as devices push and pull them.
//!
//! ## Row Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐        │
//! │  │    Product      │   │      Sale       │   │     Debtor      │        │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │        │
//! │  │  shopId         │   │  shopId         │   │  shopId         │        │
//! │  │  productId (key)│   │  receiptNo (key)│   │  receiptNo (key)│        │
//! │  │  barcode / sku  │   │  items[]        │   │  total / paid   │        │
//! │  │  price / stock  │   │  total / paid   │   │  balance        │        │
//! │  │  updatedAt      │   │  createdAt      │   │  status         │        │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘        │
//! │                                                                         │
//! │  Shop, ShopAlias, Device, Staff, DebtorPayment follow the same rules    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Rules
//! - JSON keys are camelCase, timestamps are epoch milliseconds.
//! - Every field deserializes leniently (see [`crate::wire::de`]).
//! - Keys the engine does not know land in `extra` and are written back
//!   untouched, so newer device builds can round-trip their own fields.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::money::{is_settled, outstanding, round2};
use crate::wire::de;

/// Epoch milliseconds.
pub type Millis = i64;

/// Unknown fields carried along on a row.
pub type Extra = Map<String, Value>;

fn is_false(b: &bool) -> bool {
    !*b
}

// =============================================================================
// Role
// =============================================================================

/// Who is calling, as asserted by the authorization layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Device,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Device => "device",
        }
    }
}

// =============================================================================
// Shop
// =============================================================================

/// Shop profile row. Key: `shopId`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    #[serde(default, deserialize_with = "de::string")]
    pub shop_id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub shop_name: String,
    #[serde(default, deserialize_with = "de::string")]
    pub address: String,
    #[serde(default, deserialize_with = "de::string")]
    pub phone: String,
    #[serde(default, deserialize_with = "de::string")]
    pub whatsapp: String,
    #[serde(default, deserialize_with = "de::string")]
    pub tagline: String,
    #[serde(default, deserialize_with = "de::string")]
    pub currency: String,
    #[serde(default, deserialize_with = "de::string")]
    pub footer: String,

    /// Per-shop "expiring soon" window in days. Ignored unless in 1..=365.
    #[serde(
        default,
        deserialize_with = "de::opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry_soon_days: Option<i64>,

    #[serde(default, deserialize_with = "de::bool", skip_serializing_if = "is_false")]
    pub is_merged: bool,
    #[serde(default, deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub merged_into: String,

    #[serde(default, deserialize_with = "de::millis")]
    pub created_at: Millis,
    #[serde(default, deserialize_with = "de::millis")]
    pub updated_at: Millis,

    #[serde(flatten)]
    pub extra: Extra,
}

impl Shop {
    pub fn new(shop_id: impl Into<String>, now: Millis) -> Self {
        Shop {
            shop_id: shop_id.into(),
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }

    /// Redirect target when this shop was merged away.
    pub fn merge_target(&self) -> Option<&str> {
        let target = self.merged_into.trim();
        (self.is_merged && !target.is_empty()).then_some(target)
    }
}

// =============================================================================
// Shop Alias
// =============================================================================

/// Redirect edge `from → to`. Key: `from`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopAlias {
    #[serde(default, deserialize_with = "de::string")]
    pub from: String,
    #[serde(default, deserialize_with = "de::string")]
    pub to: String,
    #[serde(default, deserialize_with = "de::millis")]
    pub created_at: Millis,
    #[serde(default, deserialize_with = "de::millis")]
    pub updated_at: Millis,
    #[serde(flatten)]
    pub extra: Extra,
}

// =============================================================================
// Device
// =============================================================================

/// Paired device. The engine only re-homes these during a shop merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default, deserialize_with = "de::string")]
    pub shop_id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub device_id: String,
    #[serde(default, deserialize_with = "de::bool", skip_serializing_if = "is_false")]
    pub revoked: bool,
    #[serde(default, deserialize_with = "de::millis")]
    pub updated_at: Millis,
    #[serde(flatten)]
    pub extra: Extra,
}

// =============================================================================
// Product
// =============================================================================

/// Catalog row. Key: `(shopId, productId)`.
///
/// `productId` is device-local, so it is only trusted for pushes from the
/// owning device's own catalog. Sale lines go through the matcher instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default, deserialize_with = "de::string")]
    pub shop_id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub product_id: String,

    /// Legacy local id from older app builds.
    #[serde(default, deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, deserialize_with = "de::string")]
    pub barcode: String,
    #[serde(default, deserialize_with = "de::string")]
    pub sku: String,
    #[serde(default, deserialize_with = "de::string")]
    pub name: String,
    #[serde(default, deserialize_with = "de::f64")]
    pub price: f64,
    #[serde(default, deserialize_with = "de::i64")]
    pub stock: i64,

    #[serde(default, deserialize_with = "de::millis")]
    pub updated_at: Millis,
    #[serde(default, deserialize_with = "de::millis")]
    pub created_at: Millis,

    /// Expiry fields, category, cost price and anything else devices send.
    #[serde(flatten)]
    pub extra: Extra,
}

impl Product {
    /// Last-known modification time: `updatedAt`, falling back to `createdAt`.
    pub fn stamp(&self) -> Millis {
        if self.updated_at > 0 {
            self.updated_at
        } else {
            self.created_at
        }
    }

    /// True when `wanted` equals either the product id or the legacy id.
    pub fn has_id(&self, wanted: &str) -> bool {
        let wanted = wanted.trim();
        !wanted.is_empty() && (self.product_id.trim() == wanted || self.id.trim() == wanted)
    }
}

// =============================================================================
// Staff
// =============================================================================

/// Staff account row. Key: `(shopId, staffId)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    #[serde(default, deserialize_with = "de::string")]
    pub shop_id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub staff_id: String,
    #[serde(default, deserialize_with = "de::string", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub username: String,
    #[serde(default, deserialize_with = "de::millis")]
    pub created_at: Millis,
    #[serde(default, deserialize_with = "de::millis")]
    pub updated_at: Millis,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Staff {
    pub fn stamp(&self) -> Millis {
        if self.updated_at > 0 {
            self.updated_at
        } else {
            self.created_at
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Ingested sale. Key: `(shopId, receiptNo)`. Immutable once stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    #[serde(default, deserialize_with = "de::string")]
    pub shop_id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub receipt_no: String,

    /// Raw line entries, shape varies by app version.
    #[serde(default, deserialize_with = "de::values", skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Value>,

    #[serde(default, deserialize_with = "de::f64")]
    pub total: f64,
    #[serde(default, deserialize_with = "de::f64")]
    pub paid: f64,
    #[serde(
        default,
        deserialize_with = "de::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub remaining: Option<f64>,

    #[serde(default, deserialize_with = "de::string")]
    pub customer_name: String,
    #[serde(default, deserialize_with = "de::string")]
    pub customer_phone: String,

    #[serde(default, deserialize_with = "de::millis")]
    pub created_at: Millis,

    /// Stock was deducted for this receipt.
    #[serde(default, deserialize_with = "de::bool", skip_serializing_if = "is_false")]
    pub stock_applied: bool,

    /// The unpaid remainder was forwarded to the debtor ledger.
    #[serde(default, deserialize_with = "de::bool", skip_serializing_if = "is_false")]
    pub debtor_applied: bool,

    #[serde(flatten)]
    pub extra: Extra,
}

impl Sale {
    /// Amount left unpaid: explicit `remaining` when present, else
    /// `max(0, total - paid)`. Never negative.
    pub fn owed(&self) -> f64 {
        match self.remaining {
            Some(remaining) => remaining.max(0.0),
            None => outstanding(self.total, self.paid),
        }
    }
}

// =============================================================================
// Debtor
// =============================================================================

/// Ledger status, always derived from the balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DebtorStatus {
    Paid,
    #[default]
    Partial,
}

impl DebtorStatus {
    pub fn for_balance(balance: f64) -> Self {
        if is_settled(balance) {
            DebtorStatus::Paid
        } else {
            DebtorStatus::Partial
        }
    }
}

/// Amount owed on one receipt. Key: `(shopId, receiptNo)`.
///
/// ## Invariants
/// - `balance == max(0, total - paid)`
/// - `status == PAID` iff `balance <= EPSILON`
///
/// Both hold after every load (see [`RawDebtor`]) and after every
/// [`Debtor::recompute`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawDebtor")]
pub struct Debtor {
    pub shop_id: String,
    pub receipt_no: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub total: f64,
    pub paid: f64,
    pub balance: f64,
    pub status: DebtorStatus,
    pub created_at: Millis,
    pub updated_at: Millis,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Debtor {
    /// Rounds the amounts and re-derives `balance` and `status`.
    pub fn recompute(&mut self) {
        self.total = round2(self.total.max(0.0));
        self.paid = round2(self.paid.max(0.0));
        self.balance = round2(outstanding(self.total, self.paid));
        self.status = DebtorStatus::for_balance(self.balance);
    }

    pub fn is_open(&self) -> bool {
        !is_settled(self.balance)
    }

    /// Rows written by very old builds carry no receipt number.
    pub fn is_legacy(&self) -> bool {
        self.receipt_no.trim().is_empty()
    }
}

/// Debtor as found on disk, before legacy aliases are folded in.
///
/// Older builds wrote `totalOwed`, `totalPaid` and `remainingOwed` instead of
/// `total`, `paid` and `balance`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDebtor {
    #[serde(default, deserialize_with = "de::string")]
    shop_id: String,
    #[serde(default, deserialize_with = "de::string")]
    receipt_no: String,
    #[serde(default, deserialize_with = "de::string")]
    customer_name: String,
    #[serde(default, deserialize_with = "de::string")]
    customer_phone: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    total: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    total_owed: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    paid: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    total_paid: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    balance: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    remaining_owed: Option<f64>,
    /// Always re-derived from the balance.
    #[serde(default, rename = "status")]
    _status: IgnoredAny,
    #[serde(default, deserialize_with = "de::millis")]
    created_at: Millis,
    #[serde(default, deserialize_with = "de::millis")]
    updated_at: Millis,
    #[serde(flatten)]
    extra: Extra,
}

impl From<RawDebtor> for Debtor {
    fn from(raw: RawDebtor) -> Self {
        let total = raw.total.or(raw.total_owed).unwrap_or(0.0);
        let paid = raw
            .paid
            .or(raw.total_paid)
            .or_else(|| raw.balance.or(raw.remaining_owed).map(|b| total - b))
            .unwrap_or(0.0);
        let mut debtor = Debtor {
            shop_id: raw.shop_id,
            receipt_no: raw.receipt_no,
            customer_name: raw.customer_name,
            customer_phone: raw.customer_phone,
            total,
            paid,
            balance: 0.0,
            status: DebtorStatus::Partial,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            extra: raw.extra,
        };
        debtor.recompute();
        debtor
    }
}

// =============================================================================
// Debtor Payment
// =============================================================================

/// Append-only payment record, one per debtor row touched by a payment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtorPayment {
    #[serde(default, deserialize_with = "de::string")]
    pub id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub shop_id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub receipt_no: String,
    #[serde(default, deserialize_with = "de::string")]
    pub customer_name: String,
    #[serde(default, deserialize_with = "de::string")]
    pub customer_phone: String,
    #[serde(default, deserialize_with = "de::f64")]
    pub amount: f64,
    #[serde(default, deserialize_with = "de::string")]
    pub method: String,
    #[serde(default, deserialize_with = "de::string")]
    pub note: String,
    #[serde(default, deserialize_with = "de::millis")]
    pub created_at: Millis,
    #[serde(default, deserialize_with = "de::string")]
    pub by: String,
    #[serde(flatten)]
    pub extra: Extra,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_product_keeps_unknown_fields() {
        let product: Product = serde_json::from_value(json!({
            "shopId": "S1",
            "productId": 7,
            "name": "Peak Milk",
            "price": "450",
            "stock": "12",
            "expiryDate": "2030-01-01",
            "category": "Dairy"
        }))
        .unwrap();

        assert_eq!(product.product_id, "7");
        assert_eq!(product.price, 450.0);
        assert_eq!(product.stock, 12);
        assert_eq!(product.extra["category"], "Dairy");

        let back = serde_json::to_value(&product).unwrap();
        assert_eq!(back["expiryDate"], "2030-01-01");
        assert_eq!(back["productId"], "7");
    }

    #[test]
    fn test_product_stamp_falls_back_to_created() {
        let product = Product {
            created_at: 10,
            ..Default::default()
        };
        assert_eq!(product.stamp(), 10);
    }

    #[test]
    fn test_debtor_folds_legacy_aliases() {
        let debtor: Debtor = serde_json::from_value(json!({
            "shopId": "S1",
            "receiptNo": "R1",
            "totalOwed": 500,
            "remainingOwed": 200,
            "status": "whatever"
        }))
        .unwrap();

        assert_eq!(debtor.total, 500.0);
        assert_eq!(debtor.paid, 300.0);
        assert_eq!(debtor.balance, 200.0);
        assert_eq!(debtor.status, DebtorStatus::Partial);
        assert!(!debtor.extra.contains_key("totalOwed"));
    }

    #[test]
    fn test_debtor_status_recomputed_on_load() {
        let debtor: Debtor = serde_json::from_value(json!({
            "receiptNo": "R2",
            "total": 100,
            "paid": 100,
            "status": "PARTIAL"
        }))
        .unwrap();
        assert_eq!(debtor.balance, 0.0);
        assert_eq!(debtor.status, DebtorStatus::Paid);

        let out = serde_json::to_value(&debtor).unwrap();
        assert_eq!(out["status"], "PAID");
    }

    #[test]
    fn test_sale_owed_prefers_explicit_remaining() {
        let sale = Sale {
            total: 1000.0,
            paid: 400.0,
            remaining: Some(100.0),
            ..Default::default()
        };
        assert_eq!(sale.owed(), 100.0);

        let sale = Sale {
            remaining: None,
            ..sale
        };
        assert_eq!(sale.owed(), 600.0);
    }

    #[test]
    fn test_sale_markers_skipped_when_false() {
        let out = serde_json::to_value(Sale::default()).unwrap();
        assert!(out.get("stockApplied").is_none());
        assert!(out.get("items").is_none());
    }
}
