//! # Product Reconciler
//!
//! Upserts catalog snapshots pushed by a device.
//!
//! ## Stock Conflict Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  T1  device A snapshots   { stock: 10, updatedAt: T1 }                  │
//! │  T2  relay ingests a sale  stock 10 → 5, updatedAt = T2                 │
//! │  T3  device A pushes its T1 snapshot                                    │
//! │                                                                         │
//! │  stored.updatedAt (T2) > incoming.updatedAt (T1)                        │
//! │  AND incoming.stock (10) > stored.stock (5)                             │
//! │       → keep stock = 5, merge every other field                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only stock is guarded. Other fields are last-write-wins.
//!
//! Pushes come from the owning device's own catalog, so rows are located by
//! `(shopId, productId)` here, not through the matcher.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::types::{Millis, Product, Staff};
use crate::wire::{first_millis, first_text, integer};

/// Counters returned by a push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertReport {
    pub upserts: usize,
    /// Rows where the conflict guard kept the stored stock.
    pub protected: usize,
    /// Items dropped for lack of a key.
    pub skipped: usize,
}

/// Applies `patch` over the JSON form of `base` (shallow, like an object
/// spread) and reads the result back.
pub fn overlay<T: Serialize + DeserializeOwned>(
    base: &T,
    patch: &Map<String, Value>,
) -> serde_json::Result<T> {
    let mut merged = match serde_json::to_value(base)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(merged))
}

fn stamped(obj: &Map<String, Value>, pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut row = obj.clone();
    for (key, value) in pairs {
        row.insert((*key).to_string(), value.clone());
    }
    row
}

// =============================================================================
// Products
// =============================================================================

/// Upserts pushed product snapshots into `shop_id`'s catalog.
///
/// Never deletes. Items without `productId`/`id` are skipped.
pub fn upsert_products(
    doc: &mut Document,
    shop_id: &str,
    items: &[Value],
    now: Millis,
) -> CoreResult<UpsertReport> {
    let mut report = UpsertReport::default();

    for item in items {
        let Some(obj) = item.as_object() else {
            report.skipped += 1;
            continue;
        };
        let product_id = first_text(obj, &["productId", "id"]);
        if product_id.is_empty() {
            report.skipped += 1;
            continue;
        }

        let row = stamped(
            obj,
            &[
                ("shopId", Value::from(shop_id)),
                ("productId", Value::from(product_id.as_str())),
                ("updatedAt", Value::from(now)),
            ],
        );

        match doc.products.position(shop_id, &product_id) {
            Some(index) => {
                let Some(prev) = doc.products.at(index) else { continue };
                let mut merged: Product =
                    overlay(prev, &row).map_err(|e| CoreError::invalid_record("product", e))?;

                let prev_stamp = prev.stamp();
                let incoming_stamp = first_millis(obj, &["updatedAt", "createdAt"]).unwrap_or(0);
                let incoming_stock = obj.get("stock").and_then(integer).unwrap_or(prev.stock);

                if prev_stamp > incoming_stamp && incoming_stock > prev.stock {
                    debug!(
                        shop_id,
                        product_id = %product_id,
                        stored = prev.stock,
                        incoming = incoming_stock,
                        "Stale snapshot, keeping stored stock"
                    );
                    merged.stock = prev.stock;
                    report.protected += 1;
                }

                if let Some(slot) = doc.products.at_mut(index) {
                    *slot = merged;
                }
            }
            None => {
                let mut product: Product = serde_json::from_value(Value::Object(row))
                    .map_err(|e| CoreError::invalid_record("product", e))?;
                if product.created_at <= 0 {
                    product.created_at = now;
                }
                doc.products.put(product);
            }
        }

        report.upserts += 1;
    }

    info!(
        shop_id,
        upserts = report.upserts,
        protected = report.protected,
        skipped = report.skipped,
        "Products upserted"
    );
    Ok(report)
}

// =============================================================================
// Staffs
// =============================================================================

/// Upserts pushed staff rows. Key: `staffId`, falling back to `id`, then
/// `username`. An existing row also matches on `id` or `username`.
pub fn upsert_staffs(
    doc: &mut Document,
    shop_id: &str,
    items: &[Value],
    now: Millis,
) -> CoreResult<UpsertReport> {
    let mut report = UpsertReport::default();

    for item in items {
        let Some(obj) = item.as_object() else {
            report.skipped += 1;
            continue;
        };
        let staff_id = first_text(obj, &["staffId", "id", "username"]);
        if staff_id.is_empty() {
            report.skipped += 1;
            continue;
        }
        let username = first_text(obj, &["username"]);

        let row = stamped(
            obj,
            &[
                ("shopId", Value::from(shop_id)),
                ("staffId", Value::from(staff_id.as_str())),
                ("updatedAt", Value::from(now)),
            ],
        );

        let existing = doc.staffs.iter().position(|s| {
            s.shop_id.trim() == shop_id
                && (s.staff_id.trim() == staff_id
                    || s.id.trim() == staff_id
                    || (!username.is_empty() && s.username.trim() == username))
        });

        match existing.and_then(|i| doc.staffs.at_mut(i)) {
            Some(slot) => {
                *slot = overlay(&*slot, &row).map_err(|e| CoreError::invalid_record("staff", e))?;
            }
            None => {
                let mut staff: Staff = serde_json::from_value(Value::Object(row))
                    .map_err(|e| CoreError::invalid_record("staff", e))?;
                if staff.created_at <= 0 {
                    staff.created_at = now;
                }
                doc.staffs.put(staff);
            }
        }

        report.upserts += 1;
    }

    info!(shop_id, upserts = report.upserts, "Staffs upserted");
    Ok(report)
}

// =============================================================================
// Unit Tests
// =============================================================================
