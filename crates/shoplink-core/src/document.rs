//! # Document Model
//!
//! The whole persisted dataset of a deployment: one document, many keyed
//! collections.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Document                                                               │
//! │  ├── revision          optimistic version, bumped by every store write  │
//! │  ├── shops             key: shopId                                      │
//! │  ├── shopAliases       key: from                                        │
//! │  ├── devices           key: (shopId, deviceId)                          │
//! │  ├── products          key: (shopId, productId)                         │
//! │  ├── staffs            key: (shopId, staffId)                           │
//! │  ├── sales             key: (shopId, receiptNo)                         │
//! │  ├── debtors           key: (shopId, receiptNo)                         │
//! │  ├── debtorPayments    key: (shopId, id), append-only                   │
//! │  └── …                 pairCodes, licenses, owner users: kept verbatim  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Keyed Collections
//! A [`Collection`] is a `Vec` with natural-key lookup. Insertion order is
//! preserved (pull responses list rows in the order they arrived). Rows with
//! an empty natural key (legacy debtors) are kept but never deduplicated.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::types::{
    Debtor, DebtorPayment, Device, Millis, Product, Sale, Shop, ShopAlias, Staff,
};
use crate::wire::de;

// =============================================================================
// Keys
// =============================================================================

/// A row with a natural key.
pub trait Keyed {
    /// `(shop scope, key)`. Rows that are not shop-scoped use `""` as scope.
    fn key(&self) -> (&str, &str);

    /// Last change time. Decides which of two stored rows sharing a key is kept.
    fn stamp(&self) -> Millis;
}

/// A row that belongs to exactly one shop and can be re-homed by a merge.
pub trait ShopScoped: Keyed {
    fn set_shop_id(&mut self, shop_id: &str);

    /// Marks the row as changed so pulls pick it up. Immutable rows ignore it.
    fn touch(&mut self, now: Millis);
}

macro_rules! keyed {
    ($ty:ty, |$row:ident| $key:expr, stamp: $stamp:expr) => {
        impl Keyed for $ty {
            fn key(&self) -> (&str, &str) {
                let $row = self;
                $key
            }

            fn stamp(&self) -> Millis {
                let $row = self;
                $stamp
            }
        }
    };
}

keyed!(Shop, |s| ("", s.shop_id.as_str()), stamp: s.updated_at.max(s.created_at));
keyed!(ShopAlias, |a| ("", a.from.as_str()), stamp: a.updated_at.max(a.created_at));
keyed!(Device, |d| (d.shop_id.as_str(), d.device_id.as_str()), stamp: d.updated_at);
keyed!(Product, |p| (p.shop_id.as_str(), p.product_id.as_str()), stamp: p.updated_at.max(p.created_at));
keyed!(Staff, |s| (s.shop_id.as_str(), s.staff_id.as_str()), stamp: s.updated_at.max(s.created_at));
keyed!(Sale, |s| (s.shop_id.as_str(), s.receipt_no.as_str()), stamp: s.created_at);
keyed!(Debtor, |d| (d.shop_id.as_str(), d.receipt_no.as_str()), stamp: d.updated_at.max(d.created_at));
keyed!(DebtorPayment, |p| (p.shop_id.as_str(), p.id.as_str()), stamp: p.created_at);

macro_rules! shop_scoped {
    ($ty:ty, touch: $touch:ident) => {
        impl ShopScoped for $ty {
            fn set_shop_id(&mut self, shop_id: &str) {
                self.shop_id = shop_id.to_string();
            }

            fn touch(&mut self, now: Millis) {
                self.$touch = now;
            }
        }
    };
    ($ty:ty) => {
        impl ShopScoped for $ty {
            fn set_shop_id(&mut self, shop_id: &str) {
                self.shop_id = shop_id.to_string();
            }

            fn touch(&mut self, _now: Millis) {}
        }
    };
}

shop_scoped!(Device, touch: updated_at);
shop_scoped!(Product, touch: updated_at);
shop_scoped!(Staff, touch: updated_at);
shop_scoped!(Debtor, touch: updated_at);
shop_scoped!(Sale);
shop_scoped!(DebtorPayment);

fn same_key(row: &impl Keyed, shop_id: &str, key: &str) -> bool {
    let (row_shop, row_key) = row.key();
    let key = key.trim();
    !key.is_empty() && row_shop.trim() == shop_id.trim() && row_key.trim() == key
}

// =============================================================================
// Collection
// =============================================================================

/// Insertion-ordered rows with natural-key lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Collection<T> {
    rows: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Collection { rows: Vec::new() }
    }
}

impl<T: Keyed> Collection<T> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.rows.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.rows
    }

    pub fn position(&self, shop_id: &str, key: &str) -> Option<usize> {
        self.rows.iter().position(|row| same_key(row, shop_id, key))
    }

    pub fn get(&self, shop_id: &str, key: &str) -> Option<&T> {
        self.position(shop_id, key).map(|i| &self.rows[i])
    }

    pub fn get_mut(&mut self, shop_id: &str, key: &str) -> Option<&mut T> {
        self.position(shop_id, key).map(move |i| &mut self.rows[i])
    }

    pub fn contains(&self, shop_id: &str, key: &str) -> bool {
        self.position(shop_id, key).is_some()
    }

    pub fn at(&self, index: usize) -> Option<&T> {
        self.rows.get(index)
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut T> {
        self.rows.get_mut(index)
    }

    /// Appends `row` unless its natural key is already taken.
    ///
    /// Returns `false` (and drops the row) on a key collision.
    pub fn insert(&mut self, row: T) -> bool {
        let (shop_id, key) = row.key();
        if !key.trim().is_empty() && self.contains(shop_id, key) {
            return false;
        }
        self.rows.push(row);
        true
    }

    /// Replaces the row with the same natural key, or appends it.
    pub fn put(&mut self, row: T) {
        let (shop_id, key) = row.key();
        match self.position(shop_id, key) {
            Some(i) => self.rows[i] = row,
            None => self.rows.push(row),
        }
    }

    /// Load-time insert: a duplicate key keeps whichever row has the later stamp.
    fn load_row(&mut self, index: usize, row: T) {
        let (shop_id, key) = row.key();
        let Some(existing) = self.position(shop_id, key) else {
            self.rows.push(row);
            return;
        };
        let kept = self.rows[existing].stamp();
        if row.stamp() > kept {
            warn!(index, kept, replaced_by = row.stamp(), "Duplicate row in stored collection, keeping the newer");
            self.rows[existing] = row;
        } else {
            warn!(index, kept, "Duplicate row in stored collection, keeping the earlier");
        }
    }
}

impl<T> From<Vec<T>> for Collection<T> {
    fn from(rows: Vec<T>) -> Self {
        Collection { rows }
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Lenient load: anything that is not an array becomes empty, rows that are
/// not objects are dropped. Of two rows sharing a natural key the one with
/// the later stamp is kept, the earlier one on a tie.
impl<'de, T: DeserializeOwned + Keyed> Deserialize<'de> for Collection<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = de::values(deserializer)?;
        let mut collection = Collection::default();

        for (index, item) in items.into_iter().enumerate() {
            if !item.is_object() {
                warn!(index, "Dropping non-object row from stored collection");
                continue;
            }
            match serde_json::from_value::<T>(item) {
                Ok(row) => collection.load_row(index, row),
                Err(e) => warn!(index, error = %e, "Dropping unreadable row"),
            }
        }

        Ok(collection)
    }
}

// =============================================================================
// Document
// =============================================================================

/// The full persisted dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default, deserialize_with = "de::u64")]
    pub revision: u64,
    #[serde(default)]
    pub shops: Collection<Shop>,
    #[serde(default)]
    pub shop_aliases: Collection<ShopAlias>,
    #[serde(default)]
    pub devices: Collection<Device>,
    #[serde(default)]
    pub products: Collection<Product>,
    #[serde(default)]
    pub staffs: Collection<Staff>,
    #[serde(default)]
    pub sales: Collection<Sale>,
    #[serde(default)]
    pub debtors: Collection<Debtor>,
    #[serde(default)]
    pub debtor_payments: Collection<DebtorPayment>,

    /// Collections owned by other parts of the system.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Document {
    /// Parses a stored document. Fails only when the bytes are not a JSON
    /// object; individual bad rows are dropped.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("document root must be an object"));
        }
        serde_json::from_value(value)
    }

    pub fn to_vec_pretty(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn shop(&self, shop_id: &str) -> Option<&Shop> {
        self.shops.get("", shop_id)
    }

    pub fn shop_mut(&mut self, shop_id: &str) -> Option<&mut Shop> {
        self.shops.get_mut("", shop_id)
    }

    pub fn alias(&self, from: &str) -> Option<&ShopAlias> {
        self.shop_aliases.get("", from)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_preserves_foreign_collections() {
        let doc = Document::from_slice(
            br#"{"pairCodes":[{"code":"123456"}],"products":[],"revision":4}"#,
        )
        .unwrap();
        assert_eq!(doc.revision, 4);
        assert_eq!(doc.other["pairCodes"][0]["code"], "123456");

        let out = serde_json::to_value(&doc).unwrap();
        assert_eq!(out["pairCodes"][0]["code"], "123456");
        assert!(out["debtorPayments"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_document_tolerates_bad_rows() {
        let doc: Document = serde_json::from_value(json!({
            "products": [
                {"shopId": "S1", "productId": "P1"},
                "garbage",
                {"shopId": "S1", "productId": "P1", "name": "dup"},
            ],
            "sales": {"not": "an array"},
        }))
        .unwrap();
        assert_eq!(doc.products.len(), 1);
        assert!(doc.sales.is_empty());
    }

    #[test]
    fn test_duplicate_rows_keep_the_newer() {
        let doc: Document = serde_json::from_value(json!({
            "products": [
                {"shopId": "S1", "productId": "P1", "name": "new", "updatedAt": 20},
                {"shopId": "S1", "productId": "P1", "name": "old", "updatedAt": 10},
            ],
            "debtors": [
                {"shopId": "S1", "receiptNo": "R1", "paid": 0, "updatedAt": 5},
                {"shopId": "S1", "receiptNo": "R1", "paid": 40, "updatedAt": 9},
            ],
        }))
        .unwrap();

        assert_eq!(doc.products.len(), 1);
        assert_eq!(doc.products.get("S1", "P1").unwrap().name, "new");
        assert_eq!(doc.debtors.len(), 1);
        assert_eq!(doc.debtors.get("S1", "R1").unwrap().paid, 40.0);
    }

    #[test]
    fn test_document_rejects_non_object_root() {
        assert!(Document::from_slice(b"[1,2,3]").is_err());
        assert!(Document::from_slice(b"{not json").is_err());
    }

    #[test]
    fn test_collection_keys_trim() {
        let mut products = Collection::default();
        assert!(products.insert(Product {
            shop_id: "S1".into(),
            product_id: " P1 ".into(),
            ..Default::default()
        }));
        assert!(products.contains("S1", "P1"));
        assert!(!products.contains("S2", "P1"));
        assert!(!products.insert(Product {
            shop_id: "S1".into(),
            product_id: "P1".into(),
            ..Default::default()
        }));
    }

    #[test]
    fn test_collection_keeps_keyless_rows() {
        let mut debtors: Collection<Debtor> = Collection::default();
        assert!(debtors.insert(Debtor::default()));
        assert!(debtors.insert(Debtor::default()));
        assert_eq!(debtors.len(), 2);
        assert!(debtors.get("", "").is_none());
    }
}
