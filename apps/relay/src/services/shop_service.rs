//! Shop service: identity, profile, merges and store checks.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use shoplink_core::validation::validate_shop_id;
use shoplink_core::{get_profile, merge_shop, update_profile, Document};
use tracing::info;

use crate::auth::AuthContext;
use crate::dto::{CheckResponse, MergeRequest, MergeResponse, ProfileResponse, ResolveResponse};
use crate::error::RelayResult;
use crate::AppState;

#[derive(Debug, Clone)]
pub struct ShopService {
    state: Arc<AppState>,
}

impl ShopService {
    pub fn new(state: Arc<AppState>) -> Self {
        ShopService { state }
    }

    /// Where the caller's shop id lands after aliases and merges.
    pub async fn resolve(&self, auth: &AuthContext) -> RelayResult<ResolveResponse> {
        let doc = self.state.read().await?;
        let resolution = self.state.resolve(&doc, auth)?;
        Ok(ResolveResponse {
            ok: true,
            resolution,
            server_time: self.state.now(),
        })
    }

    pub async fn get_profile(&self, auth: &AuthContext) -> RelayResult<ProfileResponse> {
        let doc = self.state.read().await?;
        let resolution = self.state.resolve(&doc, auth)?;
        let now = self.state.now();
        Ok(ProfileResponse {
            ok: true,
            saved: None,
            profile: get_profile(&doc, &resolution, now),
            server_time: now,
        })
    }

    /// Accepts `{shop: {...}}` or the profile fields at the top level.
    pub async fn update_profile(&self, auth: &AuthContext, body: &Value) -> RelayResult<ProfileResponse> {
        let empty = Map::new();
        let patch = body
            .get("shop")
            .and_then(Value::as_object)
            .or_else(|| body.as_object())
            .unwrap_or(&empty);
        let now = self.state.now();

        let profile = self
            .state
            .transact(|doc| {
                let resolution = self.state.resolve(doc, auth)?;
                Ok(update_profile(doc, &resolution, patch, now)?)
            })
            .await?;

        Ok(ProfileResponse {
            ok: true,
            saved: Some(true),
            profile,
            server_time: now,
        })
    }

    /// Operator action. Not reachable with device credentials.
    pub async fn merge(&self, request: &MergeRequest) -> RelayResult<MergeResponse> {
        let from = validate_shop_id(&request.from)?;
        let into = validate_shop_id(&request.into)?;
        let now = self.state.now();

        let report = self
            .state
            .transact(|doc| Ok(merge_shop(doc, &from, &into, now)?))
            .await?;

        Ok(MergeResponse {
            ok: true,
            report,
            server_time: now,
        })
    }

    pub async fn check(&self) -> RelayResult<CheckResponse> {
        let store = &self.state.store;
        let migrations = store.migration_status().await?;
        let healthy = store.health_check().await && migrations.map_or(true, |m| m.is_current());
        let doc = store.load().await?;

        info!(
            backend = %store.backend(),
            revision = doc.revision,
            healthy,
            "Store checked"
        );

        Ok(CheckResponse {
            ok: healthy,
            backend: store.backend().to_string(),
            location: store.location(),
            healthy,
            revision: doc.revision,
            migrations,
            counts: collection_counts(&doc),
            server_time: self.state.now(),
        })
    }
}

fn collection_counts(doc: &Document) -> BTreeMap<String, usize> {
    [
        ("shops", doc.shops.len()),
        ("shopAliases", doc.shop_aliases.len()),
        ("devices", doc.devices.len()),
        ("products", doc.products.len()),
        ("staffs", doc.staffs.len()),
        ("sales", doc.sales.len()),
        ("debtors", doc.debtors.len()),
        ("debtorPayments", doc.debtor_payments.len()),
    ]
    .into_iter()
    .map(|(name, count)| (name.to_string(), count))
    .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{state, state_with, NOW};
    use serde_json::json;
    use shoplink_core::{Product, Shop, ShopAlias};

    fn merge(from: &str, into: &str) -> MergeRequest {
        MergeRequest {
            from: from.into(),
            into: into.into(),
        }
    }

    #[tokio::test]
    async fn test_resolve_follows_alias() {
        let mut doc = Document::default();
        doc.shop_aliases.put(ShopAlias {
            from: "OLD".into(),
            to: "S1".into(),
            ..Default::default()
        });
        let service = ShopService::new(state_with(doc));

        let resolved = service.resolve(&AuthContext::owner("OLD")).await.unwrap();
        assert_eq!(resolved.resolution.canonical, "S1");
        assert!(resolved.resolution.redirected());

        let body = serde_json::to_value(&resolved).unwrap();
        assert_eq!(body["ok"], true);
        assert_eq!(body["serverTime"], NOW);
    }

    #[tokio::test]
    async fn test_unknown_shop_gets_empty_profile() {
        let state = state();
        let service = ShopService::new(state.clone());

        let profile = service.get_profile(&AuthContext::owner("S1")).await.unwrap();
        assert_eq!(profile.saved, None);
        assert_eq!(profile.profile.shop.shop_id, "S1");
        assert!(state.read().await.unwrap().shops.is_empty());
    }

    #[tokio::test]
    async fn test_update_profile_accepts_both_envelopes() {
        let state = state();
        let service = ShopService::new(state.clone());
        let owner = AuthContext::owner("S1");

        let saved = service
            .update_profile(&owner, &json!({"shop": {"shopName": "Mama Put", "expirySoonDays": 30}}))
            .await
            .unwrap();
        assert_eq!(saved.saved, Some(true));
        assert_eq!(saved.profile.shop.shop_name, "Mama Put");

        service.update_profile(&owner, &json!({"phone": "0803"})).await.unwrap();
        let profile = service.get_profile(&owner).await.unwrap().profile;
        assert_eq!(profile.shop.shop_name, "Mama Put");
        assert_eq!(profile.shop.phone, "0803");
        assert_eq!(profile.shop.expiry_soon_days, Some(30));
    }

    #[tokio::test]
    async fn test_update_profile_rejects_bad_soon_days() {
        let state = state();
        let service = ShopService::new(state.clone());

        let err = service
            .update_profile(&AuthContext::owner("S1"), &json!({"expirySoonDays": 400}))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_body()["field"], "expirySoonDays");
        assert_eq!(state.read().await.unwrap().revision, 0);
    }

    #[tokio::test]
    async fn test_merge_moves_rows_and_redirects() {
        let mut doc = Document::default();
        doc.shops.put(Shop::new("OLD", 1));
        doc.products.put(Product {
            shop_id: "OLD".into(),
            product_id: "P1".into(),
            ..Default::default()
        });
        let state = state_with(doc);
        let service = ShopService::new(state.clone());

        let merged = service.merge(&merge("OLD", "S1")).await.unwrap();
        assert_eq!(merged.report.into, "S1");
        assert_eq!(merged.report.products, 1);

        let profile = service.get_profile(&AuthContext::owner("OLD")).await.unwrap();
        assert_eq!(profile.profile.canonical_shop_id, "S1");
        assert_eq!(profile.profile.merged_from_shop_id, "OLD");

        let doc = state.read().await.unwrap();
        assert!(doc.products.contains("S1", "P1"));
        assert!(doc.shop("OLD").unwrap().is_merged);
    }

    #[tokio::test]
    async fn test_merge_cycle_is_conflict() {
        let service = ShopService::new(state());
        service.merge(&merge("A", "B")).await.unwrap();

        let err = service.merge(&merge("B", "A")).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.to_body()["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_merge_requires_both_ids() {
        let service = ShopService::new(state());
        let err = service.merge(&merge("", "S1")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_check_reports_counts() {
        let mut doc = Document::default();
        doc.shops.put(Shop::new("S1", 1));
        let service = ShopService::new(state_with(doc));

        let check = service.check().await.unwrap();
        assert!(check.ok);
        assert_eq!(check.backend, "memory");
        assert_eq!(check.migrations, None);
        assert_eq!(check.counts["shops"], 1);
        assert_eq!(check.counts["debtorPayments"], 0);
        assert_eq!(check.counts.len(), 8);
    }

    #[tokio::test]
    async fn test_check_reports_sqlite_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::RelayConfig::default();
        config.store.backend = shoplink_db::Backend::Sqlite;
        config.store.path = dir.path().join("relay.db");
        let state = Arc::new(AppState::from_config(config).await.unwrap());

        let check = ShopService::new(state).check().await.unwrap();
        assert!(check.healthy);
        let migrations = check.migrations.unwrap();
        assert_eq!(migrations.applied, migrations.total);

        let body = serde_json::to_value(&check).unwrap();
        assert_eq!(body["backend"], "sqlite");
        assert!(body["migrations"]["total"].as_u64().unwrap() >= 1);
    }
}
