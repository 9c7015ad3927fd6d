//! # Product Identity Matcher
//!
//! Finds the stored product a sale line refers to.
//!
//! Device-local ids differ between devices, so merchant-assigned codes
//! outrank them and the name is the last resort.
//!
//! ## Rule Order (first hit wins, no scoring)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. barcode    line.barcode == product.barcode                          │
//! │  2. sku        line.sku == product.sku                                  │
//! │  3. code       "ID:<x>" → productId/id == x                             │
//! │                otherwise code vs barcode, then sku, productId, id       │
//! │  4. productId  line.productId (or legacy id) vs productId/id            │
//! │  5. name       normalized name; one candidate → it, several → the one   │
//! │                whose price equals the line price within EPSILON         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every rule only looks at products of the given shop and trims both sides
//! of each comparison. A miss is not an error: callers count it.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::money::same_amount;
use crate::types::Product;
use crate::wire::{first_text, integer, norm_name, number};

// =============================================================================
// Line Item
// =============================================================================

/// A sale or push line reduced to the fields identity can be decided on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineItem {
    pub code: String,
    pub barcode: String,
    pub sku: String,
    pub product_id: String,
    pub name: String,
    pub price: Option<f64>,
    /// Requested quantity, at least 1.
    pub qty: i64,
    /// Best human label for reports.
    pub label: String,
}

impl LineItem {
    /// Reads a raw line entry. Non-objects yield an empty line that matches
    /// nothing.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return LineItem {
                qty: 1,
                ..Default::default()
            };
        };

        let qty = obj.get("qty").and_then(integer).unwrap_or(1).max(1);

        LineItem {
            code: first_text(obj, &["code"]),
            barcode: first_text(obj, &["barcode"]),
            sku: first_text(obj, &["sku"]),
            product_id: first_text(obj, &["productId", "id"]),
            name: first_text(obj, &["productName", "name"]),
            price: obj.get("price").and_then(number),
            qty,
            label: first_text(
                obj,
                &["productName", "name", "code", "barcode", "sku", "plu", "productId"],
            ),
        }
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Which rule produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchRule {
    Barcode,
    Sku,
    Code,
    ProductId,
    NamePrice,
}

/// A hit: position in the product slice plus the rule that found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductMatch {
    pub index: usize,
    pub rule: MatchRule,
}

/// A single identity rule over the product slice.
pub type Rule = fn(&[Product], &str, &LineItem) -> Option<usize>;

/// The rules in precedence order.
pub const RULES: [(MatchRule, Rule); 5] = [
    (MatchRule::Barcode, by_barcode),
    (MatchRule::Sku, by_sku),
    (MatchRule::Code, by_code),
    (MatchRule::ProductId, by_product_id),
    (MatchRule::NamePrice, by_name_price),
];

fn in_shop(product: &Product, shop_id: &str) -> bool {
    product.shop_id.trim() == shop_id.trim()
}

fn position_where(
    products: &[Product],
    shop_id: &str,
    pred: impl Fn(&Product) -> bool,
) -> Option<usize> {
    products
        .iter()
        .position(|p| in_shop(p, shop_id) && pred(p))
}

fn field_eq(stored: &str, wanted: &str) -> bool {
    !wanted.is_empty() && stored.trim() == wanted
}

pub fn by_barcode(products: &[Product], shop_id: &str, line: &LineItem) -> Option<usize> {
    let wanted = line.barcode.trim();
    if wanted.is_empty() {
        return None;
    }
    position_where(products, shop_id, |p| field_eq(&p.barcode, wanted))
}

pub fn by_sku(products: &[Product], shop_id: &str, line: &LineItem) -> Option<usize> {
    let wanted = line.sku.trim();
    if wanted.is_empty() {
        return None;
    }
    position_where(products, shop_id, |p| field_eq(&p.sku, wanted))
}

/// `ID:<x>` addresses a product id directly and never falls through to the
/// other fields.
pub fn by_code(products: &[Product], shop_id: &str, line: &LineItem) -> Option<usize> {
    let code = line.code.trim();
    if code.is_empty() {
        return None;
    }

    let has_id_prefix = code
        .get(..3)
        .map(|prefix| prefix.eq_ignore_ascii_case("ID:"))
        .unwrap_or(false);
    if has_id_prefix {
        let real_id = code[3..].trim();
        if real_id.is_empty() {
            return None;
        }
        return position_where(products, shop_id, |p| p.has_id(real_id));
    }

    position_where(products, shop_id, |p| field_eq(&p.barcode, code))
        .or_else(|| position_where(products, shop_id, |p| field_eq(&p.sku, code)))
        .or_else(|| position_where(products, shop_id, |p| field_eq(&p.product_id, code)))
        .or_else(|| position_where(products, shop_id, |p| field_eq(&p.id, code)))
}

pub fn by_product_id(products: &[Product], shop_id: &str, line: &LineItem) -> Option<usize> {
    let wanted = line.product_id.trim();
    if wanted.is_empty() {
        return None;
    }
    position_where(products, shop_id, |p| p.has_id(wanted))
}

/// Name fallback. Ambiguous names need a price to break the tie.
pub fn by_name_price(products: &[Product], shop_id: &str, line: &LineItem) -> Option<usize> {
    let name = norm_name(&line.name);
    if name.is_empty() {
        return None;
    }

    let candidates: Vec<usize> = products
        .iter()
        .enumerate()
        .filter(|(_, p)| in_shop(p, shop_id) && norm_name(&p.name) == name)
        .map(|(i, _)| i)
        .collect();

    match candidates.as_slice() {
        [] => None,
        [only] => Some(*only),
        several => {
            let price = line.price?;
            several
                .iter()
                .copied()
                .find(|&i| same_amount(products[i].price, price))
        }
    }
}

// =============================================================================
// Combinator
// =============================================================================

/// Runs `rules` in order and returns the first hit.
pub fn first_match(
    rules: &[(MatchRule, Rule)],
    products: &[Product],
    shop_id: &str,
    line: &LineItem,
) -> Option<ProductMatch> {
    rules.iter().find_map(|(rule, apply)| {
        apply(products, shop_id, line).map(|index| ProductMatch { index, rule: *rule })
    })
}

/// Resolves `line` against the products of `shop_id` using [`RULES`].
pub fn find_product(products: &[Product], shop_id: &str, line: &LineItem) -> Option<ProductMatch> {
    let hit = first_match(&RULES, products, shop_id, line);
    match &hit {
        Some(m) => debug!(shop_id, rule = ?m.rule, index = m.index, "Line matched"),
        None => debug!(shop_id, label = %line.label, "Line unmatched"),
    }
    hit
}

// =============================================================================
// Unit Tests
// =============================================================================
