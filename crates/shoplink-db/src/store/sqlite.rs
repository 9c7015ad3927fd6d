//! SQLite backend.
//!
//! The body column holds the same JSON the file backend writes. The
//! `revision` column is authoritative; whatever `revision` the body carries
//! is overwritten on load.

use async_trait::async_trait;
use shoplink_core::Document;
use tracing::{debug, warn};

use super::{Backend, DocumentStore};
use crate::error::{DbError, DbResult};
use crate::migrations::MigrationStatus;
use crate::pool::Database;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
    strict_load: bool,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        SqliteStore { db, strict_load: false }
    }

    pub fn strict_load(mut self, strict: bool) -> Self {
        self.strict_load = strict;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn write_revision(&self, doc: &Document, expected: u64) -> DbResult<()> {
        let body = serde_json::to_string(doc)?;
        let now = chrono::Utc::now().timestamp_millis();
        let repo = self.db.documents();

        if !repo.compare_and_swap(expected, doc.revision, &body, now).await? {
            let found = repo.revision().await?;
            return Err(DbError::RevisionConflict { expected, found });
        }

        debug!(revision = doc.revision, bytes = body.len(), "Document row written");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn location(&self) -> String {
        "sqlite documents#1".to_string()
    }

    async fn load(&self) -> DbResult<Document> {
        let repo = self.db.documents();
        let Some(row) = repo.fetch().await? else {
            return Ok(Document::default());
        };

        match Document::from_slice(row.body.as_bytes()) {
            Ok(mut doc) => {
                doc.revision = row.revision;
                Ok(doc)
            }
            Err(err) if self.strict_load => Err(DbError::corrupt("documents#1", err)),
            Err(err) => {
                let reason = err.to_string();
                let now = chrono::Utc::now().timestamp_millis();
                if repo.preserve_corrupt(row.revision, &row.body, &reason, now).await? {
                    warn!(
                        revision = row.revision,
                        reason = %reason,
                        "Stored document is corrupt, starting from an empty document"
                    );
                } else {
                    debug!(revision = row.revision, "Corrupt document already archived");
                }
                // Keep the row's revision so the next save replaces it.
                Ok(Document {
                    revision: row.revision,
                    ..Default::default()
                })
            }
        }
    }

    async fn save(&self, doc: &mut Document) -> DbResult<()> {
        let expected = doc.revision;
        doc.revision = expected + 1;
        let result = self.write_revision(doc, expected).await;
        if result.is_err() {
            doc.revision = expected;
        }
        result
    }

    async fn health_check(&self) -> bool {
        self.db.health_check().await
    }

    async fn migration_status(&self) -> DbResult<Option<MigrationStatus>> {
        Ok(Some(self.db.migration_status().await?))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use shoplink_core::Shop;

    async fn store(dir: &tempfile::TempDir) -> SqliteStore {
        let db = Database::new(DbConfig::new(dir.path().join("relay.db"))).await.unwrap();
        SqliteStore::new(db)
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let mut doc = store.load().await.unwrap();
        doc.shops.put(Shop::new("S1", 3));
        store.save(&mut doc).await.unwrap();
        store.save(&mut doc).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.revision, 2);
        assert_eq!(loaded, doc);
    }

    #[tokio::test]
    async fn test_stale_save_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let mut first = store.load().await.unwrap();
        let mut second = store.load().await.unwrap();
        store.save(&mut first).await.unwrap();

        let err = store.save(&mut second).await.unwrap_err();
        assert!(matches!(err, DbError::RevisionConflict { expected: 0, found: 1 }));
        assert_eq!(second.revision, 0);
    }

    #[tokio::test]
    async fn test_corrupt_body_is_archived() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let repo = store.database().documents();
        assert!(repo.compare_and_swap(0, 4, "garbage", 1).await.unwrap());

        let mut doc = store.load().await.unwrap();
        assert_eq!(doc.revision, 4);
        assert!(doc.shops.is_empty());
        assert_eq!(repo.corrupt_count().await.unwrap(), 1);

        store.save(&mut doc).await.unwrap();
        assert_eq!(store.load().await.unwrap().revision, 5);
    }

    #[tokio::test]
    async fn test_corrupt_body_is_archived_once_per_revision() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let repo = store.database().documents();
        assert!(repo.compare_and_swap(0, 4, "garbage", 1).await.unwrap());

        for _ in 0..5 {
            assert_eq!(store.load().await.unwrap().revision, 4);
        }
        assert_eq!(repo.corrupt_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_strict_load_fails_on_corrupt_body() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await.strict_load(true);
        assert!(store.database().documents().compare_and_swap(0, 1, "[]", 1).await.unwrap());

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, DbError::Corrupt { .. }));
    }
}
