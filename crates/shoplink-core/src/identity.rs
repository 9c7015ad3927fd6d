//! # Shop Identity Resolver
//!
//! Maps any shop id a device presents to the canonical shop it belongs to.
//!
//! ## Redirect Chain
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   OLD-1 ──alias──► OLD-2 ──isMerged/mergedInto──► MAIN                  │
//! │                                                                         │
//! │   At every hop:                                                         │
//! │   1. ShopAlias { from == current }      (wins when both exist)          │
//! │   2. Shop { isMerged, mergedInto }                                      │
//! │   3. neither → current is canonical                                     │
//! │                                                                         │
//! │   A visited set stops the walk on a cycle (A → B → A returns B), so a   │
//! │   chain of N edges resolves in at most N + 1 steps.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Resolution never fails. An empty id maps to itself; callers reject it.
//!
//! The module also owns the two operator actions that create redirects:
//! [`link_alias`] and [`merge_shop`].

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::document::{Collection, Document, ShopScoped};
use crate::error::{CoreError, CoreResult};
use crate::types::{Millis, Shop, ShopAlias};
use crate::validation::validate_alias;

// =============================================================================
// Resolution
// =============================================================================

/// Outcome of canonicalizing a shop id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub original: String,
    pub canonical: String,
    /// Edges followed.
    pub hops: usize,
    /// The walk stopped because it revisited an id.
    pub cycle: bool,
}

impl Resolution {
    pub fn redirected(&self) -> bool {
        self.original != self.canonical
    }
}

fn next_hop<'a>(doc: &'a Document, current: &str) -> Option<&'a str> {
    if let Some(alias) = doc.alias(current) {
        let to = alias.to.trim();
        if !to.is_empty() {
            return Some(to);
        }
    }
    doc.shop(current).and_then(Shop::merge_target)
}

/// Follows alias and merge edges from `shop_id` to the canonical id.
pub fn resolve_shop(doc: &Document, shop_id: &str) -> Resolution {
    let original = shop_id.trim().to_string();
    let mut current = original.clone();
    let mut visited: HashSet<String> = HashSet::new();
    let mut hops = 0;
    let mut cycle = false;

    if !current.is_empty() {
        visited.insert(current.clone());
        while let Some(next) = next_hop(doc, &current) {
            if !visited.insert(next.to_string()) {
                cycle = true;
                break;
            }
            current = next.to_string();
            hops += 1;
        }
    }

    if cycle {
        debug!(shop_id = %original, canonical = %current, "Shop redirect cycle detected");
    }

    Resolution {
        original,
        canonical: current,
        hops,
        cycle,
    }
}

/// True when the redirect walk starting at `start` passes through `target`.
fn reaches(doc: &Document, start: &str, target: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = start;
    loop {
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            return false;
        }
        match next_hop(doc, current) {
            Some(next) => current = next,
            None => return false,
        }
    }
}

/// Shorthand for `resolve_shop(doc, shop_id).canonical`.
pub fn canonical_shop_id(doc: &Document, shop_id: &str) -> String {
    resolve_shop(doc, shop_id).canonical
}

// =============================================================================
// Alias Registration
// =============================================================================

/// Creates or re-points the alias `from → to`.
///
/// ## Errors
/// - `ValidationError` when either id is empty or they are equal
/// - `Conflict` when the redirect walk from `to` passes through `from`
pub fn link_alias(doc: &mut Document, from: &str, to: &str, now: Millis) -> CoreResult<ShopAlias> {
    let (from, to) = validate_alias(from, to)?;

    if reaches(doc, &to, &from) {
        let target = resolve_shop(doc, &to);
        return Err(CoreError::Conflict {
            message: format!("alias {from} -> {to} would create a redirect cycle"),
            context: vec![
                ("from".to_string(), from),
                ("canonicalShopId".to_string(), target.canonical),
            ],
        });
    }

    let alias = match doc.shop_aliases.get_mut("", &from) {
        Some(existing) => {
            existing.to = to;
            existing.updated_at = now;
            existing.clone()
        }
        None => {
            let alias = ShopAlias {
                from,
                to,
                created_at: now,
                updated_at: now,
                ..Default::default()
            };
            doc.shop_aliases.put(alias.clone());
            alias
        }
    };

    info!(from = %alias.from, to = %alias.to, "Shop alias linked");
    Ok(alias)
}

// =============================================================================
// Shop Merge
// =============================================================================

/// Rows moved by a merge, per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub from: String,
    pub into: String,
    pub products: usize,
    pub staffs: usize,
    pub sales: usize,
    pub debtors: usize,
    pub debtor_payments: usize,
    pub devices: usize,
    /// Rows left under the old id because the key already exists under the
    /// canonical shop.
    pub skipped: usize,
}

/// Re-homes rows of one collection. Returns `(moved, skipped)`.
fn migrate<T: ShopScoped>(
    rows: &mut Collection<T>,
    from: &str,
    into: &str,
    now: Millis,
) -> (usize, usize) {
    let mut moved = 0;
    let mut skipped = 0;

    for index in 0..rows.len() {
        let Some(row) = rows.at(index) else { continue };
        let (shop_id, key) = row.key();
        if shop_id.trim() != from {
            continue;
        }
        if !key.trim().is_empty() && rows.contains(into, key) {
            skipped += 1;
            continue;
        }
        if let Some(row) = rows.at_mut(index) {
            row.set_shop_id(into);
            row.touch(now);
            moved += 1;
        }
    }

    (moved, skipped)
}

/// Merges shop `from` into `into`.
///
/// ## Steps
/// 1. Link the alias `from → into` (same rules as [`link_alias`])
/// 2. Mark the `from` shop row `isMerged`, pointing at the canonical id
/// 3. Create the canonical shop row if it does not exist
/// 4. Move every shop-scoped row whose key is free under the canonical id
pub fn merge_shop(doc: &mut Document, from: &str, into: &str, now: Millis) -> CoreResult<MergeReport> {
    let alias = link_alias(doc, from, into, now)?;
    let from = alias.from;
    let canonical = canonical_shop_id(doc, &alias.to);

    match doc.shop_mut(&from) {
        Some(shop) => {
            shop.is_merged = true;
            shop.merged_into = canonical.clone();
            shop.updated_at = now;
        }
        None => {
            let mut shop = Shop::new(from.clone(), now);
            shop.is_merged = true;
            shop.merged_into = canonical.clone();
            doc.shops.put(shop);
        }
    }
    if doc.shop(&canonical).is_none() {
        doc.shops.put(Shop::new(canonical.clone(), now));
    }

    let mut report = MergeReport {
        from: from.clone(),
        into: canonical.clone(),
        ..Default::default()
    };

    let mut skipped = 0;
    let mut count = |(moved, skip): (usize, usize)| {
        skipped += skip;
        moved
    };
    report.products = count(migrate(&mut doc.products, &from, &canonical, now));
    report.staffs = count(migrate(&mut doc.staffs, &from, &canonical, now));
    report.sales = count(migrate(&mut doc.sales, &from, &canonical, now));
    report.debtors = count(migrate(&mut doc.debtors, &from, &canonical, now));
    report.debtor_payments = count(migrate(&mut doc.debtor_payments, &from, &canonical, now));
    report.devices = count(migrate(&mut doc.devices, &from, &canonical, now));
    report.skipped = skipped;

    info!(
        from = %report.from,
        into = %report.into,
        products = report.products,
        sales = report.sales,
        debtors = report.debtors,
        skipped = report.skipped,
        "Shop merged"
    );

    Ok(report)
}

// =============================================================================
// Unit Tests
// =============================================================================
