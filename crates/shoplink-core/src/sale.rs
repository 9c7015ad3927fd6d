//! # Sale Ingestion Pipeline
//!
//! Turns one pushed sale into a stored receipt, stock movements and, when
//! the customer left a balance, a debtor entry.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  body ──► IncomingSale::from_body          shape normalization (400)    │
//! │             │                                                           │
//! │             ▼                                                           │
//! │           receipt key                      receiptNo|receipt|invoiceNo  │
//! │             │                              |billNo, else SYNC-<ms>-<id> │
//! │             ▼                                                           │
//! │           expiry gate                      any expired line → reject    │
//! │             │                              whole sale (409), no writes  │
//! │             ▼                                                           │
//! │  ─ ─ ─ ─ ─ ─ ─ ─ ─ first mutation ─ ─ ─ ─ ─ ─ ─ ─ ─                     │
//! │           insert unless (shopId, receiptNo) exists                      │
//! │             │                                                           │
//! │             ▼                                                           │
//! │           stock deduction                  skipped if stockApplied      │
//! │             │                                                           │
//! │             ▼                                                           │
//! │           debtor forwarding                skipped if debtorApplied     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retry Safety
//! The stored row carries `stockApplied` / `debtorApplied` once each side
//! effect landed. A retried push finds the row, sees the markers and does
//! nothing. Rows written before the markers existed get one more attempt,
//! after which they are marked too.

use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::debtor::accumulate;
use crate::document::Document;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::expiry::{classify, product_expiry, ymd, ExpiryClass};
use crate::matcher::{find_product, LineItem};
use crate::money::{is_settled, outstanding};
use crate::types::{Millis, Product, Sale};
use crate::validation::soon_window;
use crate::wire::{first_millis, first_text, number};
use crate::GENERATED_RECEIPT_PREFIX;

/// Top-level keys that make a bare body count as a sale.
pub const SALE_KEYS: [&str; 9] = [
    "receiptNo",
    "receipt",
    "items",
    "cartItems",
    "total",
    "paid",
    "remaining",
    "customerName",
    "customerPhone",
];

const RECEIPT_KEYS: [&str; 4] = ["receiptNo", "receipt", "invoiceNo", "billNo"];
const CREATED_KEYS: [&str; 3] = ["createdAt", "time", "timestamp"];
const MARKER_KEYS: [&str; 2] = ["stockApplied", "debtorApplied"];

pub const EXPIRED_BLOCK_CODE: &str = "EXPIRED_BLOCK";
pub const EXPIRED_MESSAGE_EN: &str =
    "Sale blocked: expired product(s) found. Please remove expired items before checkout.";
pub const EXPIRED_MESSAGE_HA: &str = "An hana sayarwa: an samu kayayyakin da suka wuce ranar karewa. Ka cire expired items kafin checkout.";

// =============================================================================
// Normalization
// =============================================================================

/// Where the sale object was found in the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// `{ sale: {…} }`
    Sale,
    /// `{ data: { sale: {…} } }`
    DataSale,
    /// `{ payload: { sale: {…} } }`
    PayloadSale,
    /// The body itself.
    Bare,
}

impl Envelope {
    fn locate(body: &Value) -> Option<(Envelope, &Map<String, Value>)> {
        let nested = [
            (Envelope::Sale, body.get("sale")),
            (Envelope::DataSale, body.get("data").and_then(|d| d.get("sale"))),
            (Envelope::PayloadSale, body.get("payload").and_then(|p| p.get("sale"))),
        ];
        for (envelope, candidate) in nested {
            if let Some(obj) = candidate.and_then(Value::as_object) {
                return Some((envelope, obj));
            }
        }

        let obj = body.as_object()?;
        SALE_KEYS
            .iter()
            .any(|key| obj.contains_key(*key))
            .then_some((Envelope::Bare, obj))
    }
}

/// A pushed sale in one canonical shape.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingSale {
    pub envelope: Envelope,
    /// Empty when the device sent no receipt number.
    pub receipt_no: String,
    pub created_at: Option<Millis>,
    pub lines: Vec<LineItem>,
    pub total: f64,
    pub paid: f64,
    pub remaining: Option<f64>,
    pub customer_name: String,
    pub customer_phone: String,
    /// The sale object as sent, stored verbatim (minus engine markers).
    pub raw: Map<String, Value>,
}

impl IncomingSale {
    /// Extracts the sale from any accepted body shape.
    ///
    /// ## Errors
    /// `InvalidFormat { field: "sale" }` when no shape matches.
    pub fn from_body(body: &Value) -> Result<Self, ValidationError> {
        let (envelope, obj) = Envelope::locate(body).ok_or_else(|| ValidationError::InvalidFormat {
            field: "sale".to_string(),
            reason: "sale required".to_string(),
        })?;

        let line_values = match (obj.get("items"), obj.get("cartItems")) {
            (Some(Value::Array(items)), _) => items.as_slice(),
            (_, Some(Value::Array(items))) => items.as_slice(),
            _ => &[],
        };

        let mut raw = obj.clone();
        for key in MARKER_KEYS {
            raw.remove(key);
        }

        Ok(IncomingSale {
            envelope,
            receipt_no: first_text(obj, &RECEIPT_KEYS),
            created_at: first_millis(obj, &CREATED_KEYS),
            lines: line_values.iter().map(LineItem::from_value).collect(),
            total: obj.get("total").and_then(number).unwrap_or(0.0),
            paid: obj.get("paid").and_then(number).unwrap_or(0.0),
            remaining: obj.get("remaining").and_then(number),
            customer_name: first_text(obj, &["customerName"]),
            customer_phone: first_text(obj, &["customerPhone"]),
            raw,
        })
    }

    /// Unpaid amount: explicit `remaining` wins, else `max(0, total - paid)`.
    pub fn owed(&self) -> f64 {
        match self.remaining {
            Some(remaining) => remaining.max(0.0),
            None => outstanding(self.total, self.paid),
        }
    }
}

// =============================================================================
// Context & Reports
// =============================================================================

/// Clock and policy inputs supplied by the caller.
#[derive(Debug, Clone, Copy)]
pub struct SaleContext {
    pub now: Millis,
    /// Business day, in `tz`.
    pub today: NaiveDate,
    pub tz: FixedOffset,
    /// Used when the shop has no valid `expirySoonDays`.
    pub default_soon_days: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReport {
    pub deducted_items: usize,
    pub not_found_items: usize,
    pub qty_total: i64,
}

/// One product named in an expiry warning or block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryNotice {
    pub name: String,
    pub code: String,
    pub expiry_date: String,
}

impl ExpiryNotice {
    fn new(product: &Product, line: &LineItem, expiry: NaiveDate) -> Self {
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        let plu = product
            .extra
            .get("plu")
            .map(crate::wire::text)
            .unwrap_or_default();

        let name = non_empty(&product.name)
            .or_else(|| non_empty(&line.label))
            .unwrap_or_else(|| "Item".to_string());
        let code = [
            product.barcode.as_str(),
            product.sku.as_str(),
            plu.as_str(),
            product.product_id.as_str(),
            product.id.as_str(),
            line.label.as_str(),
        ]
        .into_iter()
        .find_map(non_empty)
        .unwrap_or_default();

        ExpiryNotice {
            name,
            code,
            expiry_date: ymd(expiry),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryWarnings {
    pub expiring_soon_days: i64,
    pub expiring_soon: Vec<ExpiryNotice>,
}

/// Rejection of a sale that contains expired inventory.
///
/// The two messages are opaque storefront strings, passed through as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiredBlock {
    pub code: String,
    pub message_en: String,
    pub message_ha: String,
    pub items: Vec<ExpiryNotice>,
}

impl ExpiredBlock {
    pub fn new(items: Vec<ExpiryNotice>) -> Self {
        ExpiredBlock {
            code: EXPIRED_BLOCK_CODE.to_string(),
            message_en: EXPIRED_MESSAGE_EN.to_string(),
            message_ha: EXPIRED_MESSAGE_HA.to_string(),
            items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleOutcome {
    /// The receipt is stored (now or by an earlier push).
    pub saved: bool,
    /// The receipt already existed before this push.
    pub duplicate: bool,
    pub receipt_no: String,
    pub stock: StockReport,
    pub warnings: ExpiryWarnings,
    /// Amount forwarded to the debtor ledger by this push.
    pub debt_forwarded: f64,
}

// =============================================================================
// Ingestion
// =============================================================================

/// Screens every line against expiry. Returns the soon-to-expire notices,
/// or the block when anything is already expired.
fn expiry_gate(
    doc: &Document,
    shop_id: &str,
    lines: &[LineItem],
    ctx: &SaleContext,
) -> Result<ExpiryWarnings, ExpiredBlock> {
    let soon_days = soon_window(
        doc.shop(shop_id).and_then(|shop| shop.expiry_soon_days),
        ctx.default_soon_days,
    );
    let products = doc.products.as_slice();

    let mut expired = Vec::new();
    let mut soon = Vec::new();

    for line in lines {
        let Some(hit) = find_product(products, shop_id, line) else { continue };
        let product = &products[hit.index];
        let Some(expiry) = product_expiry(product, ctx.tz) else { continue };

        match classify(expiry, ctx.today, soon_days) {
            ExpiryClass::Expired => expired.push(ExpiryNotice::new(product, line, expiry)),
            ExpiryClass::Soon => soon.push(ExpiryNotice::new(product, line, expiry)),
            ExpiryClass::Fresh => {}
        }
    }

    if !expired.is_empty() {
        return Err(ExpiredBlock::new(expired));
    }
    Ok(ExpiryWarnings {
        expiring_soon_days: soon_days,
        expiring_soon: soon,
    })
}

fn deduct_stock(doc: &mut Document, shop_id: &str, lines: &[LineItem], now: Millis) -> StockReport {
    let mut report = StockReport::default();

    for line in lines {
        let hit = find_product(doc.products.as_slice(), shop_id, line);
        match hit.and_then(|m| doc.products.at_mut(m.index)) {
            Some(product) => {
                product.stock = product.stock.saturating_sub(line.qty).max(0);
                product.updated_at = now;
                report.deducted_items += 1;
                report.qty_total = report.qty_total.saturating_add(line.qty);
            }
            None => report.not_found_items += 1,
        }
    }

    report
}

fn generated_receipt(now: Millis) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{GENERATED_RECEIPT_PREFIX}-{now}-{}", &suffix[..8])
}

/// Ingests one pushed sale for the canonical shop `shop_id`.
///
/// ## Errors
/// - `Validation` when the body holds no sale (nothing mutated)
/// - `ExpiredBlock` when any line is expired (nothing mutated)
///
/// Unmatched lines and missing customer fields never fail the sale.
pub fn ingest_sale(
    doc: &mut Document,
    shop_id: &str,
    body: &Value,
    ctx: &SaleContext,
) -> CoreResult<SaleOutcome> {
    let incoming = IncomingSale::from_body(body)?;

    let receipt_no = if incoming.receipt_no.is_empty() {
        generated_receipt(ctx.now)
    } else {
        incoming.receipt_no.clone()
    };

    let warnings = expiry_gate(doc, shop_id, &incoming.lines, ctx).map_err(|block| {
        warn!(
            shop_id,
            receipt_no = %receipt_no,
            expired = block.items.len(),
            "Sale blocked by expired items"
        );
        CoreError::ExpiredBlock(block)
    })?;

    // ---- insert (idempotent on receipt) ----
    let (duplicate, stock_done, debtor_done) = match doc.sales.get(shop_id, &receipt_no) {
        Some(stored) => (true, stored.stock_applied, stored.debtor_applied),
        None => {
            let mut row = incoming.raw.clone();
            row.insert("shopId".to_string(), Value::from(shop_id));
            row.insert("receiptNo".to_string(), Value::from(receipt_no.as_str()));
            row.insert(
                "createdAt".to_string(),
                Value::from(incoming.created_at.unwrap_or(ctx.now)),
            );
            let sale: Sale = serde_json::from_value(Value::Object(row))
                .map_err(|e| CoreError::invalid_record("sale", e))?;
            doc.sales.put(sale);
            (false, false, false)
        }
    };

    // ---- stock ----
    let stock = if stock_done {
        StockReport::default()
    } else {
        deduct_stock(doc, shop_id, &incoming.lines, ctx.now)
    };
    if stock.not_found_items > 0 {
        warn!(
            shop_id,
            receipt_no = %receipt_no,
            not_found = stock.not_found_items,
            "Sale lines without a matching product"
        );
    }

    // ---- debtor ----
    let mut debt_forwarded = 0.0;
    if !debtor_done {
        let owed = incoming.owed();
        if !is_settled(owed) {
            accumulate(
                doc,
                shop_id,
                &receipt_no,
                owed,
                &incoming.customer_name,
                &incoming.customer_phone,
                ctx.now,
            );
            debt_forwarded = owed;
        }
    }

    if let Some(stored) = doc.sales.get_mut(shop_id, &receipt_no) {
        stored.stock_applied = true;
        stored.debtor_applied = true;
    }

    info!(
        shop_id,
        receipt_no = %receipt_no,
        duplicate,
        deducted = stock.deducted_items,
        not_found = stock.not_found_items,
        debt_forwarded,
        "Sale ingested"
    );

    Ok(SaleOutcome {
        saved: true,
        duplicate,
        receipt_no,
        stock,
        warnings,
        debt_forwarded,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Shop;
    use serde_json::json;

    const NOW: Millis = 1_750_000_000_000;

    fn ctx() -> SaleContext {
        SaleContext {
            now: NOW,
            today: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            tz: FixedOffset::east_opt(3600).unwrap(),
            default_soon_days: 90,
        }
    }

    fn product(pid: &str, barcode: &str, stock: i64, expiry: Option<&str>) -> Product {
        let mut p = Product {
            shop_id: "S1".into(),
            product_id: pid.into(),
            barcode: barcode.into(),
            name: format!("Product {pid}"),
            stock,
            updated_at: 1,
            ..Default::default()
        };
        if let Some(expiry) = expiry {
            p.extra.insert("expiryDate".into(), json!(expiry));
        }
        p
    }

    fn doc() -> Document {
        let mut doc = Document::default();
        doc.products.put(product("P1", "111", 10, Some("2030-01-01")));
        doc.products.put(product("P2", "222", 10, Some("2025-05-31")));
        doc.products.put(product("P3", "333", 10, Some("2025-06-20")));
        doc
    }

    fn stock(doc: &Document, pid: &str) -> i64 {
        doc.products.get("S1", pid).unwrap().stock
    }

    #[test]
    fn test_envelope_shapes() {
        let shapes = [
            (json!({"sale": {"receiptNo": "R1"}}), Envelope::Sale),
            (json!({"data": {"sale": {"receiptNo": "R1"}}}), Envelope::DataSale),
            (json!({"payload": {"sale": {"receiptNo": "R1"}}}), Envelope::PayloadSale),
            (json!({"receipt": "R1", "total": 10}), Envelope::Bare),
        ];
        for (body, envelope) in shapes {
            let sale = IncomingSale::from_body(&body).unwrap();
            assert_eq!(sale.envelope, envelope);
            assert_eq!(sale.receipt_no, "R1");
        }

        let err = IncomingSale::from_body(&json!({"hello": 1})).unwrap_err();
        assert_eq!(err.field(), "sale");
        assert!(IncomingSale::from_body(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_incoming_fallbacks() {
        let sale = IncomingSale::from_body(&json!({
            "billNo": "B-7",
            "time": 1234,
            "cartItems": [{"barcode": "111", "qty": 2}],
            "total": "1000",
            "paid": 400,
            "stockApplied": true
        }))
        .unwrap();
        assert_eq!(sale.receipt_no, "B-7");
        assert_eq!(sale.created_at, Some(1234));
        assert_eq!(sale.lines.len(), 1);
        assert_eq!(sale.owed(), 600.0);
        assert!(!sale.raw.contains_key("stockApplied"));
    }

    #[test]
    fn test_ingest_deducts_and_forwards_debt() {
        let mut doc = doc();
        let body = json!({"sale": {
            "receiptNo": "R1",
            "items": [{"barcode": "111", "qty": 3}, {"barcode": "nope"}],
            "total": 1000, "paid": 300,
            "customerName": "Musa", "customerPhone": "0803"
        }});

        let out = ingest_sale(&mut doc, "S1", &body, &ctx()).unwrap();
        assert!(out.saved);
        assert!(!out.duplicate);
        assert_eq!(out.stock, StockReport { deducted_items: 1, not_found_items: 1, qty_total: 3 });
        assert_eq!(out.debt_forwarded, 700.0);
        assert_eq!(stock(&doc, "P1"), 7);
        assert_eq!(doc.products.get("S1", "P1").unwrap().updated_at, NOW);

        let debtor = doc.debtors.get("S1", "R1").unwrap();
        assert_eq!(debtor.balance, 700.0);
        assert_eq!(debtor.customer_phone, "0803");

        let sale = doc.sales.get("S1", "R1").unwrap();
        assert!(sale.stock_applied && sale.debtor_applied);
    }

    #[test]
    fn test_huge_quantities_saturate() {
        let mut doc = doc();
        let body = json!({
            "receiptNo": "R-BIG",
            "items": [{"barcode": "111", "qty": 1e19}, {"barcode": "111", "qty": 1e19}],
            "total": 0, "paid": 0
        });

        let out = ingest_sale(&mut doc, "S1", &body, &ctx()).unwrap();
        assert_eq!(out.stock.deducted_items, 2);
        assert_eq!(out.stock.qty_total, i64::MAX);
        assert_eq!(stock(&doc, "P1"), 0);
    }

    #[test]
    fn test_receipt_retry_is_idempotent() {
        let mut doc = doc();
        let body = json!({"receiptNo": "R1", "items": [{"barcode": "111", "qty": 2}], "total": 500, "paid": 0});

        ingest_sale(&mut doc, "S1", &body, &ctx()).unwrap();
        let again = ingest_sale(&mut doc, "S1", &body, &ctx()).unwrap();

        assert!(again.duplicate);
        assert_eq!(again.stock, StockReport::default());
        assert_eq!(again.debt_forwarded, 0.0);
        assert_eq!(doc.sales.len(), 1);
        assert_eq!(stock(&doc, "P1"), 8);
        assert_eq!(doc.debtors.get("S1", "R1").unwrap().total, 500.0);
    }

    #[test]
    fn test_legacy_duplicate_gets_one_more_attempt() {
        let mut doc = doc();
        doc.sales.put(Sale {
            shop_id: "S1".into(),
            receipt_no: "OLD".into(),
            ..Default::default()
        });
        let body = json!({"receiptNo": "OLD", "items": [{"barcode": "111"}]});

        let first = ingest_sale(&mut doc, "S1", &body, &ctx()).unwrap();
        assert!(first.duplicate);
        assert_eq!(first.stock.deducted_items, 1);
        ingest_sale(&mut doc, "S1", &body, &ctx()).unwrap();
        assert_eq!(stock(&doc, "P1"), 9);
    }

    #[test]
    fn test_expired_block_is_atomic() {
        let mut doc = doc();
        let before = doc.clone();
        let body = json!({"receiptNo": "R9",
            "items": [{"barcode": "111"}, {"barcode": "222"}],
            "total": 100, "paid": 0});

        let err = ingest_sale(&mut doc, "S1", &body, &ctx()).unwrap_err();
        match err {
            CoreError::ExpiredBlock(block) => {
                assert_eq!(block.code, "EXPIRED_BLOCK");
                assert_eq!(block.items.len(), 1);
                assert_eq!(block.items[0].code, "222");
                assert_eq!(block.items[0].expiry_date, "2025-05-31");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(doc, before);
        assert!(doc.sales.is_empty());
        assert!(doc.debtors.is_empty());
    }

    #[test]
    fn test_expiring_soon_warning_uses_shop_window() {
        let mut doc = doc();
        let mut shop = Shop::new("S1", 1);
        shop.expiry_soon_days = Some(10);
        doc.shops.put(shop);

        let body = json!({"receiptNo": "R2", "items": [{"barcode": "333"}]});
        let out = ingest_sale(&mut doc, "S1", &body, &ctx()).unwrap();
        assert_eq!(out.warnings.expiring_soon_days, 10);
        assert!(out.warnings.expiring_soon.is_empty());

        doc.shop_mut("S1").unwrap().expiry_soon_days = Some(30);
        let body = json!({"receiptNo": "R3", "items": [{"barcode": "333"}]});
        let out = ingest_sale(&mut doc, "S1", &body, &ctx()).unwrap();
        assert_eq!(out.warnings.expiring_soon.len(), 1);
        assert_eq!(out.warnings.expiring_soon[0].expiry_date, "2025-06-20");
    }

    #[test]
    fn test_receiptless_sale_gets_generated_key() {
        let mut doc = doc();
        let out = ingest_sale(&mut doc, "S1", &json!({"total": 50, "paid": 10}), &ctx()).unwrap();
        assert!(out.receipt_no.starts_with(&format!("SYNC-{NOW}-")));
        assert_eq!(out.receipt_no.len(), format!("SYNC-{NOW}-").len() + 8);
        assert_eq!(doc.debtors.get("S1", &out.receipt_no).unwrap().balance, 40.0);
    }

    #[test]
    fn test_explicit_remaining_wins() {
        let mut doc = doc();
        let body = json!({"receiptNo": "R5", "total": 1000, "paid": 0, "remaining": 0});
        let out = ingest_sale(&mut doc, "S1", &body, &ctx()).unwrap();
        assert_eq!(out.debt_forwarded, 0.0);
        assert!(doc.debtors.is_empty());
    }
}
