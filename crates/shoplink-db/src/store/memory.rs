//! In-process backend for tests and `backend = "memory"`. Nothing survives a restart.

use async_trait::async_trait;
use shoplink_core::Document;
use tokio::sync::Mutex;

use super::{Backend, DocumentStore};
use crate::error::{DbError, DbResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Document>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Starts from `doc` as if it had been saved at its own revision.
    pub fn with_document(doc: Document) -> Self {
        MemoryStore {
            document: Mutex::new(doc),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    fn location(&self) -> String {
        "memory".to_string()
    }

    async fn load(&self) -> DbResult<Document> {
        Ok(self.document.lock().await.clone())
    }

    async fn save(&self, doc: &mut Document) -> DbResult<()> {
        let mut stored = self.document.lock().await;
        if stored.revision != doc.revision {
            return Err(DbError::RevisionConflict {
                expected: doc.revision,
                found: stored.revision,
            });
        }
        doc.revision += 1;
        *stored = doc.clone();
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_revision_check() {
        let store = MemoryStore::new();
        let mut a = store.load().await.unwrap();
        let mut b = store.load().await.unwrap();

        store.save(&mut a).await.unwrap();
        store.save(&mut a).await.unwrap();
        assert_eq!(a.revision, 2);

        let err = store.save(&mut b).await.unwrap_err();
        assert!(matches!(err, DbError::RevisionConflict { expected: 0, found: 2 }));
    }

    #[tokio::test]
    async fn test_seeded_document() {
        let doc = Document {
            revision: 7,
            ..Default::default()
        };
        let store = MemoryStore::with_document(doc);
        let mut loaded = store.load().await.unwrap();
        store.save(&mut loaded).await.unwrap();
        assert_eq!(loaded.revision, 8);
    }
}
