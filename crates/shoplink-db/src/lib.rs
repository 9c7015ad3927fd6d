//! # shoplink-db: Document Store for ShopLink
//!
//! Loads and saves the single shop dataset [`Document`](shoplink_core::Document)
//! with an optimistic revision check.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ShopLink Data Flow                               │
//! │                                                                         │
//! │  Relay service (push sale)                                              │
//! │       │  lock → load → reconcile → save                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                   shoplink-db (THIS CRATE)                      │    │
//! │  │                                                                 │    │
//! │  │  ┌────────────────┐  ┌────────────────┐  ┌────────────────┐     │    │
//! │  │  │ JsonFileStore  │  │  SqliteStore   │  │  MemoryStore   │     │    │
//! │  │  │ tmp + rename   │  │ pool.rs + CAS  │  │ tests          │     │    │
//! │  │  └────────────────┘  └────────────────┘  └────────────────┘     │    │
//! │  │             all behind  Arc<dyn DocumentStore>                  │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  shoplink.json  or  relay.db (documents table, WAL)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - The [`DocumentStore`] trait, backends, [`open_store`]
//! - [`pool`] - SQLite connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`repository`] - SQL for the document row
//! - [`error`] - Store error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shoplink_db::{open_store, StoreConfig};
//!
//! let store = open_store(&StoreConfig::default()).await?;
//! let mut doc = store.load().await?;
//! // ... reconcile ...
//! store.save(&mut doc).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use migrations::MigrationStatus;
pub use pool::{Database, DbConfig};
pub use repository::document::{DocumentRepository, StoredDocument};
pub use store::{open_store, Backend, DocumentStore, JsonFileStore, MemoryStore, SqliteStore, StoreConfig};
