//! # SQLite Pool
//!
//! Opens the pool behind [`SqliteStore`](crate::SqliteStore) and brings the
//! schema up to date before the first load.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  StoreConfig { backend: sqlite, path, max_connections,                  │
//! │                connect_timeout_secs }                                   │
//! │       │  DbConfig::from(&StoreConfig)                                   │
//! │       ▼                                                                 │
//! │  Database::new ── WAL, NORMAL sync ── SqlitePool ── MIGRATOR.run        │
//! │       │                                                                 │
//! │       ├── documents()          single-row compare-and-swap              │
//! │       ├── migration_status()   reported by `check`                      │
//! │       └── health_check()                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pulls read while a push writes; WAL keeps readers off the writer's lock.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations::{self, MigrationStatus};
use crate::repository::document::DocumentRepository;
use crate::store::StoreConfig;

/// Idle connections are dropped after this long.
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Pool settings for one database file.
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    pub database_path: PathBuf,
    /// At least 1.
    pub max_connections: u32,
    /// How long a request waits for a free connection.
    pub connect_timeout: Duration,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl From<&StoreConfig> for DbConfig {
    fn from(config: &StoreConfig) -> Self {
        DbConfig::new(&config.path)
            .max_connections(config.max_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
    }
}

/// SQLite pool handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if missing) the database file and applies pending
    /// migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let url = format!("sqlite://{}?mode=rwc", config.database_path.display());
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            // may lose the last commit on power loss, never corrupts
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(IDLE_TIMEOUT))
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        migrations::run_migrations(&pool).await?;

        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "SQLite store ready"
        );
        Ok(Database { pool })
    }

    pub async fn migration_status(&self) -> DbResult<MigrationStatus> {
        migrations::migration_status(&self.pool).await
    }

    pub fn documents(&self) -> DocumentRepository {
        DocumentRepository::new(self.pool.clone())
    }

    /// Closes the pool. Every later query fails.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_database_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("relay.db"))).await.unwrap();

        assert!(db.health_check().await);
        let status = db.migration_status().await.unwrap();
        assert_eq!(status.applied, status.total);
        assert!(status.total >= 1);
        assert!(status.is_current());

        db.close().await;
        assert!(!db.health_check().await);
    }

    #[tokio::test]
    async fn test_migration_status_fails_on_closed_pool() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("relay.db"))).await.unwrap();
        db.close().await;

        assert!(db.migration_status().await.is_err());
    }

    #[test]
    fn test_config_from_store_section() {
        let store = StoreConfig {
            path: PathBuf::from("/var/lib/shoplink/relay.db"),
            max_connections: 0,
            connect_timeout_secs: 3,
            ..Default::default()
        };
        let config = DbConfig::from(&store);

        assert_eq!(config.database_path, PathBuf::from("/var/lib/shoplink/relay.db"));
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
    }
}
