//! Request and response shapes.
//!
//! Push bodies stay as raw `serde_json::Value`: devices send loosely-typed
//! payloads and the core parses them field by field. Responses are typed
//! and serialize to the camelCase wire format, `ok` first.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shoplink_core::wire::de;
use shoplink_core::{Millis, MergeReport, PaymentOutcome, Resolution, SaleOutcome, ShopProfile};
use shoplink_db::MigrationStatus;

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// `serverTime` of the caller's previous pull; 0 for everything.
    #[serde(default, deserialize_with = "de::millis")]
    pub since: Millis,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    #[serde(default, deserialize_with = "de::string")]
    pub from: String,
    #[serde(default, deserialize_with = "de::string")]
    pub into: String,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub ok: bool,
    pub items: Vec<Value>,
    pub server_time: Millis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushProductsResponse {
    pub ok: bool,
    pub upserts: usize,
    pub protected: usize,
    pub skipped: usize,
    pub server_time: Millis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushStaffsResponse {
    pub ok: bool,
    pub upserts: usize,
    pub server_time: Millis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSaleResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub outcome: SaleOutcome,
    pub server_time: Millis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayDebtorResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub outcome: PaymentOutcome,
    pub server_time: Millis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillResponse {
    pub ok: bool,
    pub shop_id: String,
    pub updated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub ok: bool,
    /// Set on updates only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved: Option<bool>,
    #[serde(flatten)]
    pub profile: ShopProfile,
    pub server_time: Millis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub resolution: Resolution,
    pub server_time: Millis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub report: MergeReport,
    pub server_time: Millis,
}

/// Store health and collection sizes, for `check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub ok: bool,
    pub backend: String,
    pub location: String,
    pub healthy: bool,
    pub revision: u64,
    /// SQLite only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrations: Option<MigrationStatus>,
    pub counts: BTreeMap<String, usize>,
    pub server_time: Millis,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pull_request_accepts_string_since() {
        let req: PullRequest = serde_json::from_value(json!({"since": "1700000000000"})).unwrap();
        assert_eq!(req.since, 1_700_000_000_000);
        let req: PullRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req.since, 0);
    }

    #[test]
    fn test_response_is_camel_case() {
        let body = serde_json::to_value(PushProductsResponse {
            ok: true,
            upserts: 2,
            protected: 1,
            skipped: 0,
            server_time: 9,
        })
        .unwrap();
        assert_eq!(body, json!({"ok": true, "upserts": 2, "protected": 1, "skipped": 0, "serverTime": 9}));
    }
}
