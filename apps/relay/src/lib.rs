//! # ShopLink Relay
//!
//! Request handlers that let every POS device of a shop converge on one
//! dataset. Transport-agnostic: each service method takes an
//! [`AuthContext`] and a request body and returns a typed response or a
//! [`RelayError`] carrying its status code and JSON body.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Relay Services                                 │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐ │
//! │  │  SyncService   │  │ DebtorService  │  │  ShopService               │ │
//! │  │                │  │                │  │                            │ │
//! │  │ • pull         │  │ • pay          │  │ • resolve                  │ │
//! │  │ • push_products│  │ • backfill     │  │ • get/update_profile       │ │
//! │  │ • push_staffs  │  │                │  │ • merge (operator)         │ │
//! │  │ • push_sale    │  │                │  │ • check                    │ │
//! │  └────────────────┘  └────────────────┘  └────────────────────────────┘ │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │  AppState                                                        │   │
//! │  │  Arc<dyn DocumentStore> • RelayConfig • write lock • clock       │   │
//! │  │                                                                  │   │
//! │  │  mutations: lock → load → reconcile → save (revision checked)    │   │
//! │  │  pulls:     load → read  (no lock)                               │   │
//! │  └──────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! See [`config`]: defaults, `shoplink.toml`, then `SHOPLINK__*` variables.

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod services;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use shoplink_core::{resolve_shop, Document, Millis, Resolution, SaleContext};
use shoplink_core::validation::validate_shop_id;
use shoplink_db::{open_store, DocumentStore};
use tokio::sync::Mutex;
use tracing::debug;

// Re-exports
pub use auth::AuthContext;
pub use config::{ConfigError, RelayConfig};
pub use error::{ErrorCode, RelayError, RelayResult};
pub use services::{DebtorService, ShopService, SyncService};

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub config: RelayConfig,
    /// Serializes read-modify-write of the document within this process.
    write_lock: Mutex<()>,
    /// Pinned clock for tests and replays.
    fixed_now: Option<Millis>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, config: RelayConfig) -> Self {
        AppState {
            store,
            config,
            write_lock: Mutex::new(()),
            fixed_now: None,
        }
    }

    /// Opens the configured store.
    pub async fn from_config(config: RelayConfig) -> RelayResult<Self> {
        let store = open_store(&config.store).await?;
        Ok(AppState::new(store, config))
    }

    pub fn with_fixed_clock(mut self, now: Millis) -> Self {
        self.fixed_now = Some(now);
        self
    }

    /// Server time in epoch milliseconds.
    pub fn now(&self) -> Millis {
        self.fixed_now.unwrap_or_else(|| Utc::now().timestamp_millis())
    }

    pub fn business_tz(&self) -> FixedOffset {
        self.config.sync.business_tz()
    }

    /// The business day `now` falls on.
    pub fn today(&self, now: Millis) -> NaiveDate {
        DateTime::from_timestamp_millis(now)
            .map(|dt| dt.with_timezone(&self.business_tz()).date_naive())
            .unwrap_or_default()
    }

    pub fn sale_context(&self, now: Millis) -> SaleContext {
        SaleContext {
            now,
            today: self.today(now),
            tz: self.business_tz(),
            default_soon_days: self.config.sync.expiry_soon_days,
        }
    }

    /// Canonical shop of the caller. Fails on an empty id.
    pub fn resolve(&self, doc: &Document, auth: &AuthContext) -> RelayResult<Resolution> {
        let mut resolution = resolve_shop(doc, &auth.shop_id);
        resolution.canonical =
            validate_shop_id(&resolution.canonical).map_err(|_| RelayError::required("shopId"))?;
        if resolution.redirected() {
            debug!(
                from = %resolution.original,
                to = %resolution.canonical,
                hops = resolution.hops,
                "Shop id redirected"
            );
        }
        Ok(resolution)
    }

    /// Loads the document for a read. Takes no lock.
    pub async fn read(&self) -> RelayResult<Document> {
        Ok(self.store.load().await?)
    }

    /// Runs `mutate` against a freshly loaded document and saves it.
    ///
    /// Holds the write lock across load and save. An error from `mutate`
    /// discards the document, so nothing is written.
    pub async fn transact<T, F>(&self, mutate: F) -> RelayResult<T>
    where
        F: FnOnce(&mut Document) -> RelayResult<T> + Send,
        T: Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.store.load().await?;
        let value = mutate(&mut doc)?;
        self.store.save(&mut doc).await?;
        debug!(revision = doc.revision, "Document saved");
        Ok(value)
    }
}
