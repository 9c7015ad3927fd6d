//! Debtor service: payments against open balances and device backfills.

use std::sync::Arc;

use serde_json::Value;
use shoplink_core::{apply_payment, backfill_debtors, PaymentRequest};
use tracing::debug;

use crate::auth::AuthContext;
use crate::dto::{BackfillResponse, PayDebtorResponse};
use crate::error::{RelayError, RelayResult};
use crate::AppState;

#[derive(Debug, Clone)]
pub struct DebtorService {
    state: Arc<AppState>,
}

impl DebtorService {
    pub fn new(state: Arc<AppState>) -> Self {
        DebtorService { state }
    }

    /// Applies `{receiptNo | phone, amount, method?, note?}` oldest debt first.
    ///
    /// ## Errors
    /// - `InvalidRequest` for a non-positive amount or no receipt/phone
    /// - `NotFound` when nothing is open for the key
    pub async fn pay(&self, auth: &AuthContext, body: &Value) -> RelayResult<PayDebtorResponse> {
        let request: PaymentRequest = serde_json::from_value(body.clone())
            .map_err(|e| RelayError::invalid(format!("Invalid payment: {e}")))?;
        let now = self.state.now();
        let by = auth.actor();

        let outcome = self
            .state
            .transact(|doc| {
                let resolution = self.state.resolve(doc, auth)?;
                Ok(apply_payment(doc, &resolution.canonical, &request, &by, now)?)
            })
            .await?;

        Ok(PayDebtorResponse {
            ok: true,
            outcome,
            server_time: now,
        })
    }

    /// Customer details from a device's debtor list, `{debtors: [...]}` or a
    /// bare array.
    pub async fn backfill(&self, auth: &AuthContext, body: &Value) -> RelayResult<BackfillResponse> {
        let list: &[Value] = match body {
            Value::Array(list) => list,
            _ => body
                .get("debtors")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        };

        if list.is_empty() {
            let doc = self.state.read().await?;
            let resolution = self.state.resolve(&doc, auth)?;
            debug!(shop_id = %resolution.canonical, "Empty debtor backfill, nothing written");
            return Ok(BackfillResponse {
                ok: true,
                shop_id: resolution.canonical,
                updated: 0,
            });
        }

        let now = self.state.now();
        let (shop_id, updated) = self
            .state
            .transact(|doc| {
                let resolution = self.state.resolve(doc, auth)?;
                let updated = backfill_debtors(doc, &resolution.canonical, list, now);
                Ok((resolution.canonical, updated))
            })
            .await?;

        Ok(BackfillResponse {
            ok: true,
            shop_id,
            updated,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{state, state_with, NOW};
    use serde_json::json;
    use shoplink_core::{Debtor, DebtorStatus, Document};

    fn open(receipt: &str, total: f64, created_at: i64) -> Debtor {
        let mut debtor = Debtor {
            shop_id: "S1".into(),
            receipt_no: receipt.into(),
            customer_name: "Musa".into(),
            customer_phone: "0803".into(),
            total,
            created_at,
            ..Default::default()
        };
        debtor.recompute();
        debtor
    }

    fn ledger() -> Document {
        let mut doc = Document::default();
        doc.debtors.put(open("R1", 100.0, 1));
        doc.debtors.put(open("R2", 50.0, 2));
        doc.debtors.put(open("R3", 30.0, 3));
        doc
    }

    #[tokio::test]
    async fn test_payment_clears_oldest_first() {
        let state = state_with(ledger());
        let service = DebtorService::new(state.clone());

        let paid = service
            .pay(&AuthContext::device("S1", "POS-1"), &json!({"phone": "0803", "amount": 120}))
            .await
            .unwrap();
        assert_eq!(paid.outcome.applied, 120.0);
        assert_eq!(paid.outcome.touched, 2);
        assert_eq!(paid.outcome.payments[0].by, "POS-1");
        assert_eq!(paid.server_time, NOW);

        let doc = state.read().await.unwrap();
        let r1 = doc.debtors.get("S1", "R1").unwrap();
        assert_eq!(r1.balance, 0.0);
        assert_eq!(r1.status, DebtorStatus::Paid);
        assert_eq!(doc.debtors.get("S1", "R2").unwrap().balance, 30.0);
        assert_eq!(doc.debtors.get("S1", "R3").unwrap().balance, 30.0);
        assert_eq!(doc.debtor_payments.len(), 2);
    }

    #[tokio::test]
    async fn test_payment_without_open_debt_is_not_found() {
        let state = state_with(ledger());
        let service = DebtorService::new(state.clone());

        let err = service
            .pay(&AuthContext::owner("S1"), &json!({"phone": "0999", "amount": 10}))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(state.read().await.unwrap().revision, 0);
    }

    #[tokio::test]
    async fn test_payment_amount_must_be_positive() {
        let service = DebtorService::new(state_with(ledger()));
        let err = service
            .pay(&AuthContext::owner("S1"), &json!({"receiptNo": "R1", "amount": 0}))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_body()["field"], "amount");
    }

    #[tokio::test]
    async fn test_backfill_creates_and_fills() {
        let state = state_with(ledger());
        let service = DebtorService::new(state.clone());

        let body = json!({"debtors": [
            {"receiptNo": "R1", "customerName": "Musa Bello"},
            {"receiptNo": "R9", "customerPhone": "0701", "totalOwed": 400},
            {"customerName": "no receipt"},
        ]});
        let result = service.backfill(&AuthContext::owner("S1"), &body).await.unwrap();
        assert_eq!(result.updated, 2);
        assert_eq!(result.shop_id, "S1");

        let doc = state.read().await.unwrap();
        let r1 = doc.debtors.get("S1", "R1").unwrap();
        assert_eq!(r1.customer_name, "Musa Bello");
        assert_eq!(r1.total, 100.0);
        assert_eq!(doc.debtors.get("S1", "R9").unwrap().balance, 400.0);
    }

    #[tokio::test]
    async fn test_empty_backfill_writes_nothing() {
        let state = state();
        let service = DebtorService::new(state.clone());

        let result = service.backfill(&AuthContext::owner("S1"), &json!({})).await.unwrap();
        assert_eq!(result.updated, 0);
        assert_eq!(state.read().await.unwrap().revision, 0);
    }
}
