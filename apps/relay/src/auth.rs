//! Caller identity handed over by the authorization layer.
//!
//! Token checks, device pairing and revocation happen before a request
//! reaches the relay. What arrives here is trusted; the relay only
//! re-canonicalizes `shop_id` because credentials issued before a shop
//! merge still carry the old id.

use serde::{Deserialize, Serialize};
use shoplink_core::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub shop_id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl AuthContext {
    pub fn owner(shop_id: impl Into<String>) -> Self {
        AuthContext {
            shop_id: shop_id.into(),
            role: Role::Owner,
            device_id: None,
        }
    }

    pub fn device(shop_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        AuthContext {
            shop_id: shop_id.into(),
            role: Role::Device,
            device_id: Some(device_id.into()),
        }
    }

    /// Recorded as `by` on debtor payments.
    pub fn actor(&self) -> String {
        match self.device_id.as_deref().map(str::trim) {
            Some(device_id) if !device_id.is_empty() => device_id.to_string(),
            _ => self.role.as_str().to_string(),
        }
    }
}
