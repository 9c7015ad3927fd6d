//! # Document Stores
//!
//! One trait, three backends. The relay holds an `Arc<dyn DocumentStore>`
//! and never knows which one it got.
//!
//! ## Save Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  let mut doc = store.load().await?;      // doc.revision == N           │
//! │  mutate(&mut doc);                                                      │
//! │  store.save(&mut doc).await?;            // stored N?  write N+1        │
//! │                                          // else RevisionConflict,      │
//! │                                          //      nothing written,       │
//! │                                          //      doc.revision still N   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Corrupt Documents
//! Unreadable stored bytes are moved aside (a `.corrupt-<ms>` file, or the
//! `documents_corrupt` table) and loading continues from an empty document.
//! With `strict_load` the load fails with [`DbError::Corrupt`] instead.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shoplink_core::Document;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations::MigrationStatus;
use crate::pool::{Database, DbConfig};

pub mod json_file;
pub mod memory;
pub mod sqlite;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

// =============================================================================
// Trait
// =============================================================================

#[async_trait]
pub trait DocumentStore: Send + Sync + fmt::Debug {
    fn backend(&self) -> Backend;

    /// Where the document lives, for logs and `check`.
    fn location(&self) -> String;

    /// Reads the whole document. A store that was never written yields an
    /// empty document at revision 0.
    async fn load(&self) -> DbResult<Document>;

    /// Writes `doc` if the stored revision still equals `doc.revision`, and
    /// bumps `doc.revision` on success.
    async fn save(&self, doc: &mut Document) -> DbResult<()>;

    async fn health_check(&self) -> bool;

    /// Schema migration counts. `None` for backends without a schema.
    async fn migration_status(&self) -> DbResult<Option<MigrationStatus>> {
        Ok(None)
    }
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Json,
    Sqlite,
    Memory,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Json => "json",
            Backend::Sqlite => "sqlite",
            Backend::Memory => "memory",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "file" => Ok(Backend::Json),
            "sqlite" => Ok(Backend::Sqlite),
            "memory" | "mem" => Ok(Backend::Memory),
            other => Err(DbError::Internal(format!("unknown store backend '{other}'"))),
        }
    }
}

/// `[store]` section of the relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,

    /// JSON file or SQLite database path. Ignored by `memory`.
    pub path: PathBuf,

    /// Fail on a corrupt document instead of starting over.
    pub strict_load: bool,

    /// SQLite pool size.
    pub max_connections: u32,

    /// Seconds a SQLite request waits for a pooled connection.
    pub connect_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: Backend::Json,
            path: PathBuf::from("data/shoplink.json"),
            strict_load: false,
            max_connections: 5,
            connect_timeout_secs: 30,
        }
    }
}

impl StoreConfig {
    pub fn memory() -> Self {
        StoreConfig {
            backend: Backend::Memory,
            ..Default::default()
        }
    }
}

/// Opens the configured backend.
pub async fn open_store(config: &StoreConfig) -> DbResult<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.backend {
        Backend::Json => Arc::new(JsonFileStore::new(&config.path).strict_load(config.strict_load)),
        Backend::Sqlite => {
            let db = Database::new(DbConfig::from(config)).await?;
            Arc::new(SqliteStore::new(db).strict_load(config.strict_load))
        }
        Backend::Memory => Arc::new(MemoryStore::new()),
    };

    info!(backend = %store.backend(), location = %store.location(), "Document store opened");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("SQLite".parse::<Backend>().unwrap(), Backend::Sqlite);
        assert_eq!("file".parse::<Backend>().unwrap(), Backend::Json);
        assert!("redis".parse::<Backend>().is_err());
    }

    #[test]
    fn test_store_config_defaults() {
        let config: StoreConfig = serde_json::from_value(serde_json::json!({"backend": "memory"})).unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.connect_timeout_secs, 30);
        assert!(!config.strict_load);
    }

    #[tokio::test]
    async fn test_open_each_backend() {
        let dir = tempfile::tempdir().unwrap();
        for backend in [Backend::Json, Backend::Sqlite, Backend::Memory] {
            let config = StoreConfig {
                backend,
                path: dir.path().join(format!("store.{backend}")),
                ..Default::default()
            };
            let store = open_store(&config).await.unwrap();
            assert_eq!(store.backend(), backend);
            assert!(store.health_check().await);
            let migrations = store.migration_status().await.unwrap();
            assert_eq!(migrations.is_some(), backend == Backend::Sqlite);

            let mut doc = store.load().await.unwrap();
            assert_eq!(doc.revision, 0);
            store.save(&mut doc).await.unwrap();
            assert_eq!(store.load().await.unwrap().revision, 1);
        }
    }
}
