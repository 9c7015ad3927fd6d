//! # shoplink-core: Reconciliation Engine for ShopLink
//!
//! Everything that decides what a shop's shared dataset looks like after a
//! device pushes or pulls. Pure functions over an in-memory [`Document`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       ShopLink Relay Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │            POS devices (offline-first, many per shop)           │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │ push / pull                            │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │                apps/relay (services, config, CLI)               │    │
//! │  │        lock → load → reconcile → save → respond                 │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │              ★ shoplink-core (THIS CRATE) ★                     │    │
//! │  │                                                                 │    │
//! │  │   identity   matcher   reconcile   sale   debtor   profile      │    │
//! │  │                                                                 │    │
//! │  │   NO I/O • NO CLOCK • CALLERS PASS `now` AND `today`            │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │              shoplink-db (JSON file / SQLite / memory)          │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`document`] - The persisted dataset and its keyed collections
//! - [`types`] - Row types (Shop, Product, Sale, Debtor, …)
//! - [`identity`] - Shop id canonicalization, alias links, shop merge
//! - [`matcher`] - Sale line → stored product
//! - [`reconcile`] - Product/staff push upserts with the stock guard
//! - [`sale`] - Sale ingestion pipeline
//! - [`debtor`] - Debtor ledger
//! - [`pull`] - Incremental pulls
//! - [`profile`] - Shop profile
//! - [`wire`] - Tolerant field parsing
//! - [`expiry`], [`money`], [`validation`], [`error`]
//!
//! ## Example Usage
//!
//! ```rust
//! use serde_json::json;
//! use shoplink_core::{canonical_shop_id, upsert_products, Document};
//!
//! let mut doc = Document::default();
//! let shop_id = canonical_shop_id(&doc, "SHOP-1");
//!
//! let items = vec![json!({"productId": "P1", "name": "Rice 5kg", "stock": 12})];
//! let report = upsert_products(&mut doc, &shop_id, &items, 1_700_000_000_000).unwrap();
//!
//! assert_eq!(report.upserts, 1);
//! assert_eq!(doc.products.get("SHOP-1", "P1").unwrap().stock, 12);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod debtor;
pub mod document;
pub mod error;
pub mod expiry;
pub mod identity;
pub mod matcher;
pub mod money;
pub mod profile;
pub mod pull;
pub mod reconcile;
pub mod sale;
pub mod types;
pub mod validation;
pub mod wire;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use debtor::{
    accumulate, apply_payment, backfill_debtors, debtor_view, DebtorView, PaymentOutcome,
    PaymentRequest,
};
pub use document::{Collection, Document, Keyed, ShopScoped};
pub use error::{CoreError, CoreResult, ValidationError};
pub use identity::{canonical_shop_id, link_alias, merge_shop, resolve_shop, MergeReport, Resolution};
pub use matcher::{find_product, LineItem, MatchRule, ProductMatch};
pub use profile::{get_profile, update_profile, ShopProfile};
pub use pull::{pull, PullKind};
pub use reconcile::{upsert_products, upsert_staffs, UpsertReport};
pub use sale::{ingest_sale, ExpiredBlock, IncomingSale, SaleContext, SaleOutcome};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// "Expiring soon" window when a shop has no valid setting of its own.
pub const DEFAULT_EXPIRY_SOON_DAYS: i64 = 90;

/// Valid range for a shop's `expirySoonDays`.
pub const MIN_EXPIRY_SOON_DAYS: i64 = 1;
pub const MAX_EXPIRY_SOON_DAYS: i64 = 365;

/// Business-day offset from UTC, West Africa Time.
pub const DEFAULT_BUSINESS_UTC_OFFSET_MINUTES: i32 = 60;

/// Method recorded on a debtor payment that names none.
pub const DEFAULT_PAYMENT_METHOD: &str = "CASH";

/// Prefix of receipt keys generated for sales pushed without one.
pub const GENERATED_RECEIPT_PREFIX: &str = "SYNC";
