//! Incremental pulls.
//!
//! A device sends the `serverTime` of its last pull as `since` and receives
//! every row of its shop changed after it. `since <= 0` means everything.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::debtor::debtor_view;
use crate::document::Document;
use crate::error::ValidationError;
use crate::types::{DebtorPayment, Millis, Product, Sale, Staff};

/// The pullable collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PullKind {
    Products,
    Staffs,
    Sales,
    Debtors,
    DebtorPayments,
}

impl PullKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullKind::Products => "products",
            PullKind::Staffs => "staffs",
            PullKind::Sales => "sales",
            PullKind::Debtors => "debtors",
            PullKind::DebtorPayments => "debtorPayments",
        }
    }
}

impl fmt::Display for PullKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PullKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "products" => Ok(PullKind::Products),
            "staffs" | "staff" => Ok(PullKind::Staffs),
            "sales" => Ok(PullKind::Sales),
            "debtors" => Ok(PullKind::Debtors),
            "debtorpayments" | "payments" => Ok(PullKind::DebtorPayments),
            other => Err(ValidationError::InvalidFormat {
                field: "collection".to_string(),
                reason: format!("unknown collection '{other}'"),
            }),
        }
    }
}

fn after(stamp: Millis, since: Millis) -> bool {
    since <= 0 || stamp > since
}

fn in_shop(row_shop: &str, shop_id: &str) -> bool {
    row_shop.trim() == shop_id
}

pub fn pull_products(doc: &Document, shop_id: &str, since: Millis) -> Vec<Product> {
    doc.products
        .iter()
        .filter(|p| in_shop(&p.shop_id, shop_id) && after(p.stamp(), since))
        .cloned()
        .collect()
}

pub fn pull_staffs(doc: &Document, shop_id: &str, since: Millis) -> Vec<Staff> {
    doc.staffs
        .iter()
        .filter(|s| in_shop(&s.shop_id, shop_id) && after(s.stamp(), since))
        .cloned()
        .collect()
}

/// Sales are immutable, so `createdAt` is their change time.
pub fn pull_sales(doc: &Document, shop_id: &str, since: Millis) -> Vec<Sale> {
    doc.sales
        .iter()
        .filter(|s| in_shop(&s.shop_id, shop_id) && after(s.created_at, since))
        .cloned()
        .collect()
}

pub fn pull_payments(doc: &Document, shop_id: &str, since: Millis) -> Vec<DebtorPayment> {
    doc.debtor_payments
        .iter()
        .filter(|p| in_shop(&p.shop_id, shop_id) && after(p.created_at, since))
        .cloned()
        .collect()
}

/// Rows of one collection as wire JSON.
pub fn pull(doc: &Document, kind: PullKind, shop_id: &str, since: Millis) -> serde_json::Result<Vec<Value>> {
    fn encode<T: Serialize>(rows: Vec<T>) -> serde_json::Result<Vec<Value>> {
        rows.into_iter().map(serde_json::to_value).collect()
    }

    match kind {
        PullKind::Products => encode(pull_products(doc, shop_id, since)),
        PullKind::Staffs => encode(pull_staffs(doc, shop_id, since)),
        PullKind::Sales => encode(pull_sales(doc, shop_id, since)),
        PullKind::Debtors => encode(debtor_view(doc, shop_id, since)),
        PullKind::DebtorPayments => encode(pull_payments(doc, shop_id, since)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        let mut doc = Document::default();
        for (shop, pid, updated, created) in [("S1", "P1", 0, 100), ("S1", "P2", 300, 100), ("S2", "P3", 500, 1)] {
            doc.products.put(Product {
                shop_id: shop.into(),
                product_id: pid.into(),
                updated_at: updated,
                created_at: created,
                ..Default::default()
            });
        }
        doc
    }

    #[test]
    fn test_since_zero_returns_all_of_shop() {
        assert_eq!(pull_products(&doc(), "S1", 0).len(), 2);
        assert_eq!(pull_products(&doc(), "S1", -5).len(), 2);
    }

    #[test]
    fn test_since_uses_updated_then_created() {
        let rows = pull_products(&doc(), "S1", 150);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_id, "P2");
    }

    #[test]
    fn test_pull_kind_parse() {
        assert_eq!("debtor-payments".parse::<PullKind>().unwrap(), PullKind::DebtorPayments);
        assert_eq!("Products".parse::<PullKind>().unwrap(), PullKind::Products);
        assert!("licenses".parse::<PullKind>().is_err());
    }

    #[test]
    fn test_pull_encodes_camel_case() {
        let rows = pull(&doc(), PullKind::Products, "S2", 0).unwrap();
        assert_eq!(rows[0]["productId"], "P3");
    }
}
