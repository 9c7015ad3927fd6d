//! Sync service: incremental pulls and device pushes.

use std::sync::Arc;

use serde_json::Value;
use shoplink_core::validation::require_items;
use shoplink_core::{ingest_sale, pull, upsert_products, upsert_staffs, PullKind};
use tracing::{info, warn};

use crate::auth::AuthContext;
use crate::dto::{PullRequest, PullResponse, PushProductsResponse, PushSaleResponse, PushStaffsResponse};
use crate::error::{RelayError, RelayResult};
use crate::AppState;

/// Sync service implementation.
#[derive(Debug, Clone)]
pub struct SyncService {
    state: Arc<AppState>,
}

impl SyncService {
    pub fn new(state: Arc<AppState>) -> Self {
        SyncService { state }
    }

    /// Rows of `kind` in the caller's canonical shop changed after `since`.
    pub async fn pull(&self, auth: &AuthContext, kind: PullKind, request: PullRequest) -> RelayResult<PullResponse> {
        let doc = self.state.read().await?;
        let resolution = self.state.resolve(&doc, auth)?;
        let items = pull(&doc, kind, &resolution.canonical, request.since)?;

        info!(
            shop_id = %resolution.canonical,
            collection = %kind,
            since = request.since,
            count = items.len(),
            "Pull served"
        );

        Ok(PullResponse {
            ok: true,
            items,
            server_time: self.state.now(),
        })
    }

    /// `{items: [...]}` product snapshots from a device catalog.
    pub async fn push_products(&self, auth: &AuthContext, body: &Value) -> RelayResult<PushProductsResponse> {
        let items = require_items("items", body.get("items"))?;
        let now = self.state.now();

        let report = self
            .state
            .transact(|doc| {
                let resolution = self.state.resolve(doc, auth)?;
                Ok(upsert_products(doc, &resolution.canonical, items, now)?)
            })
            .await?;

        Ok(PushProductsResponse {
            ok: true,
            upserts: report.upserts,
            protected: report.protected,
            skipped: report.skipped,
            server_time: now,
        })
    }

    pub async fn push_staffs(&self, auth: &AuthContext, body: &Value) -> RelayResult<PushStaffsResponse> {
        let items = require_items("items", body.get("items"))?;
        let now = self.state.now();

        let report = self
            .state
            .transact(|doc| {
                let resolution = self.state.resolve(doc, auth)?;
                Ok(upsert_staffs(doc, &resolution.canonical, items, now)?)
            })
            .await?;

        Ok(PushStaffsResponse {
            ok: true,
            upserts: report.upserts,
            server_time: now,
        })
    }

    /// One sale in any accepted envelope. Safe to retry.
    pub async fn push_sale(&self, auth: &AuthContext, body: &Value) -> RelayResult<PushSaleResponse> {
        let now = self.state.now();
        let ctx = self.state.sale_context(now);

        let result = self
            .state
            .transact(|doc| {
                let resolution = self.state.resolve(doc, auth)?;
                Ok(ingest_sale(doc, &resolution.canonical, body, &ctx)?)
            })
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(RelayError::Blocked(block)) => {
                warn!(shop_id = %auth.shop_id, items = block.items.len(), "Sale rejected: expired items");
                return Err(RelayError::Blocked(block));
            }
            Err(err) => return Err(err),
        };

        Ok(PushSaleResponse {
            ok: true,
            outcome,
            server_time: now,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
