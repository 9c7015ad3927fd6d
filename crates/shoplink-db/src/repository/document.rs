//! # Document Repository
//!
//! The dataset lives in one row (`id = 1`) of the `documents` table.
//!
//! ## Compare-and-Swap
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  writer loaded revision N                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE documents SET revision = N+1, body = ?                          │
//! │   WHERE id = 1 AND revision = N                                         │
//! │       │                                                                 │
//! │       ├── 1 row  → saved                                                │
//! │       └── 0 rows → someone else saved first → RevisionConflict          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Revision 0 means "no row yet"; the first save inserts it.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// The stored row, body not yet parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub revision: u64,
    pub body: String,
}

/// Repository for the document row.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
}

impl DocumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DocumentRepository { pool }
    }

    /// Reads the document row, `None` before the first save.
    pub async fn fetch(&self) -> DbResult<Option<StoredDocument>> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT revision, body FROM documents WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(revision, body)| StoredDocument {
            revision: revision.max(0) as u64,
            body,
        }))
    }

    /// Current stored revision, 0 when no row exists.
    pub async fn revision(&self) -> DbResult<u64> {
        let revision: Option<i64> = sqlx::query_scalar("SELECT revision FROM documents WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(revision.unwrap_or(0).max(0) as u64)
    }

    /// Writes `body` as revision `next` if the stored revision is still
    /// `expected`. Returns false when it is not.
    pub async fn compare_and_swap(&self, expected: u64, next: u64, body: &str, now: i64) -> DbResult<bool> {
        debug!(expected, next, bytes = body.len(), "Swapping document row");

        let result = if expected == 0 {
            sqlx::query(
                r#"
                INSERT INTO documents (id, revision, body, updated_at)
                VALUES (1, ?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    revision = excluded.revision,
                    body = excluded.body,
                    updated_at = excluded.updated_at
                WHERE documents.revision = 0
                "#,
            )
            .bind(next as i64)
            .bind(body)
            .bind(now)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE documents
                SET
                    revision = ?1,
                    body = ?2,
                    updated_at = ?3
                WHERE id = 1 AND revision = ?4
                "#,
            )
            .bind(next as i64)
            .bind(body)
            .bind(now)
            .bind(expected as i64)
            .execute(&self.pool)
            .await?
        };

        Ok(result.rows_affected() == 1)
    }

    /// Copies an unreadable body into `documents_corrupt`, once per
    /// revision. Returns false when that revision is already archived.
    pub async fn preserve_corrupt(&self, revision: u64, body: &str, reason: &str, now: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents_corrupt (revision, body, reason, preserved_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(revision) DO NOTHING
            "#,
        )
        .bind(revision as i64)
        .bind(body)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn corrupt_count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents_corrupt")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_compare_and_swap() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("cas.db"))).await.unwrap();
        let repo = db.documents();

        assert_eq!(repo.fetch().await.unwrap(), None);
        assert_eq!(repo.revision().await.unwrap(), 0);

        assert!(repo.compare_and_swap(0, 1, "{}", 10).await.unwrap());
        assert!(!repo.compare_and_swap(0, 1, "{\"x\":1}", 11).await.unwrap());
        assert!(!repo.compare_and_swap(5, 6, "{\"x\":1}", 11).await.unwrap());
        assert!(repo.compare_and_swap(1, 2, "{\"x\":2}", 12).await.unwrap());

        let row = repo.fetch().await.unwrap().unwrap();
        assert_eq!(row.revision, 2);
        assert_eq!(row.body, "{\"x\":2}");
    }

    #[tokio::test]
    async fn test_preserve_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("c.db"))).await.unwrap();
        let repo = db.documents();

        assert!(repo.preserve_corrupt(3, "not json", "expected value", 1).await.unwrap());
        assert!(!repo.preserve_corrupt(3, "not json", "expected value", 2).await.unwrap());
        assert!(repo.preserve_corrupt(4, "still not json", "expected value", 3).await.unwrap());
        assert_eq!(repo.corrupt_count().await.unwrap(), 2);
    }
}
