//! Shop profile read/update.
//!
//! Devices print the profile on receipts, so a shop that was never
//! configured still gets an empty profile back instead of an error.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::document::Document;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::identity::Resolution;
use crate::types::{Millis, Shop};
use crate::validation::validate_expiry_soon_days;
use crate::wire::{integer, text};

/// Text fields a profile update may change.
pub const PROFILE_FIELDS: [&str; 7] = [
    "shopName", "address", "phone", "whatsapp", "tagline", "currency", "footer",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopProfile {
    pub shop: Shop,
    pub canonical_shop_id: String,
    /// The id the caller presented, when it was redirected; else empty.
    pub merged_from_shop_id: String,
}

impl ShopProfile {
    fn new(shop: Shop, resolution: &Resolution) -> Self {
        ShopProfile {
            shop,
            canonical_shop_id: resolution.canonical.clone(),
            merged_from_shop_id: if resolution.redirected() {
                resolution.original.clone()
            } else {
                String::new()
            },
        }
    }
}

/// Stored profile of the canonical shop, or an empty one stamped `now`.
pub fn get_profile(doc: &Document, resolution: &Resolution, now: Millis) -> ShopProfile {
    let shop = doc
        .shop(&resolution.canonical)
        .cloned()
        .unwrap_or_else(|| Shop::new(resolution.canonical.clone(), now));
    ShopProfile::new(shop, resolution)
}

/// Patches the canonical shop's profile, creating the row if missing.
///
/// Only [`PROFILE_FIELDS`] and `expirySoonDays` are read from `patch`;
/// absent or `null` fields keep their stored value.
pub fn update_profile(
    doc: &mut Document,
    resolution: &Resolution,
    patch: &Map<String, Value>,
    now: Millis,
) -> CoreResult<ShopProfile> {
    let soon_days = match patch.get("expirySoonDays") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let days = integer(value).ok_or_else(|| ValidationError::InvalidFormat {
                field: "expirySoonDays".to_string(),
                reason: "must be a whole number of days".to_string(),
            })?;
            Some(validate_expiry_soon_days(days)?)
        }
    };

    let shop_id = resolution.canonical.as_str();
    if doc.shop(shop_id).is_none() {
        doc.shops.put(Shop::new(shop_id, now));
    }
    let shop = doc
        .shop_mut(shop_id)
        .ok_or_else(|| CoreError::not_found("Shop", shop_id))?;

    for field in PROFILE_FIELDS {
        let Some(value) = patch.get(field).filter(|v| !v.is_null()) else { continue };
        let value = text(value);
        match field {
            "shopName" => shop.shop_name = value,
            "address" => shop.address = value,
            "phone" => shop.phone = value,
            "whatsapp" => shop.whatsapp = value,
            "tagline" => shop.tagline = value,
            "currency" => shop.currency = value,
            _ => shop.footer = value,
        }
    }
    if soon_days.is_some() {
        shop.expiry_soon_days = soon_days;
    }
    shop.updated_at = now;

    let shop = shop.clone();
    info!(shop_id, "Shop profile updated");
    Ok(ShopProfile::new(shop, resolution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::resolve_shop;
    use crate::types::ShopAlias;
    use serde_json::json;

    #[test]
    fn test_missing_shop_returns_empty_profile() {
        let doc = Document::default();
        let profile = get_profile(&doc, &resolve_shop(&doc, "S1"), 7);
        assert_eq!(profile.shop.shop_id, "S1");
        assert_eq!(profile.shop.shop_name, "");
        assert_eq!(profile.shop.created_at, 7);
        assert_eq!(profile.merged_from_shop_id, "");
    }

    #[test]
    fn test_update_creates_and_patches() {
        let mut doc = Document::default();
        doc.shop_aliases.put(ShopAlias {
            from: "OLD".into(),
            to: "S1".into(),
            ..Default::default()
        });
        let resolution = resolve_shop(&doc, "OLD");

        let patch = json!({"shopName": "Mama Put", "phone": null, "expirySoonDays": "30", "isMerged": true});
        let profile = update_profile(&mut doc, &resolution, patch.as_object().unwrap(), 9).unwrap();

        assert_eq!(profile.canonical_shop_id, "S1");
        assert_eq!(profile.merged_from_shop_id, "OLD");
        assert_eq!(profile.shop.shop_name, "Mama Put");
        assert_eq!(profile.shop.expiry_soon_days, Some(30));
        assert!(!profile.shop.is_merged);
        assert!(doc.shop("OLD").is_none());

        let patch = json!({"address": "12 Kano Rd"});
        let profile = update_profile(&mut doc, &resolution, patch.as_object().unwrap(), 10).unwrap();
        assert_eq!(profile.shop.shop_name, "Mama Put");
        assert_eq!(profile.shop.address, "12 Kano Rd");
    }

    #[test]
    fn test_update_rejects_bad_soon_window() {
        let mut doc = Document::default();
        let resolution = resolve_shop(&doc, "S1");
        let patch = json!({"expirySoonDays": 0});
        let err = update_profile(&mut doc, &resolution, patch.as_object().unwrap(), 1).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::OutOfRange { .. })));
        assert!(doc.shops.is_empty());
    }
}
