//! # Debtor Ledger
//!
//! Per-receipt customer debt: accumulation from sales, FIFO payment
//! application, the pull view and device backfill.
//!
//! ## FIFO Payment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  phone 0803, open rows oldest first:   R1 100   R2 50   R3 30           │
//! │  payment 120                                                            │
//! │                                                                         │
//! │    R1  take min(120, 100) = 100  → balance 0   PAID     left 20         │
//! │    R2  take min( 20,  50) =  20  → balance 30  PARTIAL  left 0          │
//! │    R3  untouched                                                        │
//! │                                                                         │
//! │  applied = 120, touched = 2, one DebtorPayment per touched row          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A payment larger than the open debt reports `applied < amount`. The
//! excess is never turned into credit.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::Document;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::identity::canonical_shop_id;
use crate::money::{is_settled, round2, EPSILON};
use crate::types::{Debtor, DebtorPayment, Millis};
use crate::validation::validate_amount;
use crate::wire::{de, first_text, number};
use crate::DEFAULT_PAYMENT_METHOD;

// =============================================================================
// Accumulate
// =============================================================================

/// Adds `remaining` to the debt on `(shop_id, receipt_no)`, creating the
/// row if needed. Non-empty customer fields replace stored ones.
pub fn accumulate(
    doc: &mut Document,
    shop_id: &str,
    receipt_no: &str,
    remaining: f64,
    customer_name: &str,
    customer_phone: &str,
    now: Millis,
) -> Debtor {
    let name = customer_name.trim();
    let phone = customer_phone.trim();

    if let Some(debtor) = doc.debtors.get_mut(shop_id, receipt_no) {
        debtor.total += remaining;
        if !name.is_empty() {
            debtor.customer_name = name.to_string();
        }
        if !phone.is_empty() {
            debtor.customer_phone = phone.to_string();
        }
        debtor.updated_at = now;
        debtor.recompute();
        debug!(shop_id, receipt_no, total = debtor.total, "Debtor accumulated");
        return debtor.clone();
    }

    let mut debtor = Debtor {
        shop_id: shop_id.to_string(),
        receipt_no: receipt_no.trim().to_string(),
        customer_name: name.to_string(),
        customer_phone: phone.to_string(),
        total: remaining,
        created_at: now,
        updated_at: now,
        ..Default::default()
    };
    debtor.recompute();
    doc.debtors.put(debtor.clone());
    debug!(shop_id, receipt_no, total = debtor.total, "Debtor created");
    debtor
}

// =============================================================================
// Apply Payment
// =============================================================================

/// A payment as a device or owner submits it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    #[serde(default, deserialize_with = "de::string")]
    pub receipt_no: String,
    #[serde(default, deserialize_with = "de::string")]
    pub phone: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "de::string")]
    pub method: String,
    #[serde(default, deserialize_with = "de::string")]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub applied: f64,
    pub touched: usize,
    /// `amount - applied`; no open debt was left to absorb it.
    pub unapplied: f64,
    pub payments: Vec<DebtorPayment>,
}

/// Applies a payment to the oldest open balances first.
///
/// Candidates are open rows whose shop canonicalizes to `shop_id` (rows
/// left under a merged shop's old id still count), selected by exact
/// receipt when given, else by phone. They are the rows [`debtor_view`]
/// shows: in legacy mode receipt-less rows are skipped and derived sale rows
/// are written to the ledger when reached.
///
/// ## Errors
/// - `Validation` for a non-positive amount or no receipt/phone
/// - `NotFound` when nothing is open for the key (nothing mutated)
pub fn apply_payment(
    doc: &mut Document,
    shop_id: &str,
    request: &PaymentRequest,
    by: &str,
    now: Millis,
) -> CoreResult<PaymentOutcome> {
    let amount = validate_amount(request.amount)?;
    let receipt_no = request.receipt_no.trim();
    let phone = request.phone.trim();
    if receipt_no.is_empty() && phone.is_empty() {
        return Err(ValidationError::required("receiptNo or phone").into());
    }

    let matches_key = |d: &Debtor| {
        if receipt_no.is_empty() {
            d.customer_phone.trim() == phone
        } else {
            d.receipt_no.trim() == receipt_no
        }
    };

    // Same rows the debtor view shows: legacy rows are hidden there, derived
    // rows are materialized when the payment reaches them.
    let snapshot: &Document = doc;
    let mut candidates: Vec<(Millis, Candidate)> = snapshot
        .debtors
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_open() && !d.is_legacy() && matches_key(d))
        .filter(|(_, d)| belongs_to(snapshot, &d.shop_id, shop_id))
        .map(|(index, d)| (d.created_at, Candidate::Stored(index)))
        .collect();
    candidates.extend(
        derived_debtors(snapshot, shop_id)
            .into_iter()
            .filter(|d| matches_key(d))
            .map(|d| (d.created_at, Candidate::Derived(d))),
    );

    if candidates.is_empty() {
        let key = if receipt_no.is_empty() {
            format!("phone {phone}")
        } else {
            format!("receipt {receipt_no}")
        };
        return Err(CoreError::not_found("Debtor", key));
    }
    // stable: equal timestamps keep document order
    candidates.sort_by_key(|(created_at, _)| *created_at);

    let method = match request.method.trim() {
        "" => DEFAULT_PAYMENT_METHOD.to_string(),
        m => m.to_string(),
    };

    let mut left = amount;
    let mut payments = Vec::new();

    for (_, candidate) in candidates {
        if left <= EPSILON {
            break;
        }
        let index = match candidate {
            Candidate::Stored(index) => index,
            Candidate::Derived(derived) => {
                debug!(shop_id, receipt_no = %derived.receipt_no, "Materializing derived debtor for payment");
                let Some(index) = materialize(doc, derived) else { continue };
                index
            }
        };
        let Some(debtor) = doc.debtors.at_mut(index) else { continue };

        let take = round2(left.min(debtor.balance));
        if take <= 0.0 {
            continue;
        }
        debtor.paid += take;
        debtor.updated_at = now;
        debtor.recompute();
        left -= take;

        payments.push(DebtorPayment {
            id: Uuid::new_v4().to_string(),
            shop_id: shop_id.to_string(),
            receipt_no: debtor.receipt_no.clone(),
            customer_name: debtor.customer_name.clone(),
            customer_phone: debtor.customer_phone.clone(),
            amount: take,
            method: method.clone(),
            note: request.note.trim().to_string(),
            created_at: now,
            by: by.to_string(),
            ..Default::default()
        });
    }

    for payment in &payments {
        doc.debtor_payments.insert(payment.clone());
    }

    let applied = round2(payments.iter().map(|p| p.amount).sum());
    let outcome = PaymentOutcome {
        applied,
        touched: payments.len(),
        unapplied: round2((amount - applied).max(0.0)),
        payments,
    };

    info!(
        shop_id,
        amount,
        applied = outcome.applied,
        touched = outcome.touched,
        "Debtor payment applied"
    );
    Ok(outcome)
}

/// A payment target: a ledger row, or a sale remainder not yet on the ledger.
enum Candidate {
    Stored(usize),
    Derived(Debtor),
}

fn materialize(doc: &mut Document, derived: Debtor) -> Option<usize> {
    let (shop_id, receipt_no) = (derived.shop_id.clone(), derived.receipt_no.clone());
    doc.debtors.insert(derived);
    doc.debtors.position(&shop_id, &receipt_no)
}

fn belongs_to(doc: &Document, row_shop_id: &str, shop_id: &str) -> bool {
    canonical_shop_id(doc, row_shop_id) == shop_id
}

/// Debtor rows `shop_id` would have for sales with an unpaid remainder and
/// no ledger row. Empty unless the shop still has legacy rows.
fn derived_debtors(doc: &Document, shop_id: &str) -> Vec<Debtor> {
    let legacy_mode = doc
        .debtors
        .iter()
        .any(|d| d.is_legacy() && belongs_to(doc, &d.shop_id, shop_id));
    if !legacy_mode {
        return Vec::new();
    }

    doc.sales
        .iter()
        .filter(|sale| belongs_to(doc, &sale.shop_id, shop_id))
        .filter(|sale| !is_settled(sale.owed()))
        .filter(|sale| {
            !doc.debtors.iter().any(|d| {
                d.receipt_no.trim() == sale.receipt_no.trim() && belongs_to(doc, &d.shop_id, shop_id)
            })
        })
        .map(|sale| {
            let mut debtor = Debtor {
                shop_id: shop_id.to_string(),
                receipt_no: sale.receipt_no.clone(),
                customer_name: sale.customer_name.clone(),
                customer_phone: sale.customer_phone.clone(),
                total: sale.owed(),
                created_at: sale.created_at,
                updated_at: sale.created_at,
                ..Default::default()
            };
            debtor.recompute();
            debtor
        })
        .collect()
}

// =============================================================================
// Pull View
// =============================================================================

/// A debtor row as pulled by devices.
///
/// Carries the legacy field names next to the current ones for old builds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtorView {
    #[serde(flatten)]
    pub debtor: Debtor,
    pub total_owed: f64,
    pub total_paid: f64,
    pub remaining_owed: f64,
    /// Built from a sale because the shop's ledger predates receipt keys.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub derived: bool,
}

impl From<Debtor> for DebtorView {
    fn from(debtor: Debtor) -> Self {
        DebtorView {
            total_owed: debtor.total,
            total_paid: debtor.paid,
            remaining_owed: debtor.balance,
            debtor,
            derived: false,
        }
    }
}

fn debtor_stamp(debtor: &Debtor) -> Millis {
    if debtor.updated_at > 0 {
        debtor.updated_at
    } else {
        debtor.created_at
    }
}

/// Debtor rows of `shop_id` changed after `since`, newest first. Rows left
/// under a merged shop's old id are included.
///
/// When the shop still has legacy rows without a receipt number, those are
/// hidden and every sale with an unpaid remainder but no debtor row is shown
/// as a derived row instead. [`apply_payment`] sees the same set.
pub fn debtor_view(doc: &Document, shop_id: &str, since: Millis) -> Vec<DebtorView> {
    let mut rows: Vec<DebtorView> = doc
        .debtors
        .iter()
        .filter(|d| !d.is_legacy() && belongs_to(doc, &d.shop_id, shop_id))
        .map(|d| DebtorView::from(d.clone()))
        .collect();

    rows.extend(derived_debtors(doc, shop_id).into_iter().map(|debtor| DebtorView {
        derived: true,
        ..DebtorView::from(debtor)
    }));

    rows.retain(|row| since <= 0 || debtor_stamp(&row.debtor) > since);
    rows.sort_by(|a, b| b.debtor.created_at.cmp(&a.debtor.created_at));
    rows
}

// =============================================================================
// Backfill
// =============================================================================

/// Fills customer details from device-side debtor summaries.
///
/// Existing rows get non-empty name, phone and due date. Missing receipts
/// are created with `total = totalOwed`. Amounts already on the ledger and
/// `paid` are never changed. Returns the number of summaries applied.
pub fn backfill_debtors(doc: &mut Document, shop_id: &str, list: &[Value], now: Millis) -> usize {
    let mut updated = 0;

    for entry in list {
        let Some(obj) = entry.as_object() else { continue };
        let receipt_no = first_text(obj, &["receiptNo", "receipt"]);
        if receipt_no.is_empty() {
            continue;
        }
        let name = first_text(obj, &["customerName", "name"]);
        let phone = first_text(obj, &["customerPhone", "phone"]);
        let total_owed = ["totalOwed", "total"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(number))
            .unwrap_or(0.0);
        let due_date = first_text(obj, &["dueDate"]);

        if !doc.debtors.contains(shop_id, &receipt_no) {
            let mut debtor = Debtor {
                shop_id: shop_id.to_string(),
                receipt_no: receipt_no.clone(),
                total: total_owed.max(0.0),
                created_at: now,
                ..Default::default()
            };
            debtor.recompute();
            doc.debtors.put(debtor);
        }

        if let Some(debtor) = doc.debtors.get_mut(shop_id, &receipt_no) {
            if !name.is_empty() {
                debtor.customer_name = name;
            }
            if !phone.is_empty() {
                debtor.customer_phone = phone;
            }
            if !due_date.is_empty() {
                debtor.extra.insert("dueDate".to_string(), Value::from(due_date));
            }
            debtor.updated_at = now;
            updated += 1;
        }
    }

    info!(shop_id, updated, "Debtors backfilled");
    updated
}

// =============================================================================
// Unit Tests
// =============================================================================
