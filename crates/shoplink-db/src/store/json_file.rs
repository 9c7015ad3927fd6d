//! JSON file backend.
//!
//! The document is one pretty-printed file. Writes go to `<path>.tmp` and
//! are renamed over the target, so a crash leaves either the old or the new
//! document on disk, never half of one.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use shoplink_core::wire::de;
use shoplink_core::Document;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Backend, DocumentStore};
use crate::error::{DbError, DbResult};

/// Just enough of the stored file to run the revision check.
#[derive(Deserialize)]
struct StoredRevision {
    #[serde(default, deserialize_with = "de::u64")]
    revision: u64,
}

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    strict_load: bool,
    /// Serializes check-then-rename within this process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonFileStore {
            path: path.as_ref().to_path_buf(),
            strict_load: false,
            write_lock: Mutex::new(()),
        }
    }

    pub fn strict_load(mut self, strict: bool) -> Self {
        self.strict_load = strict;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// File bytes, `None` when missing or blank.
    async fn read_bytes(&self) -> DbResult<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(DbError::io(self.path.display(), err)),
        }
    }

    /// Moves an unreadable file aside, or fails when loading is strict.
    async fn quarantine(&self, reason: &str) -> DbResult<()> {
        if self.strict_load {
            return Err(DbError::corrupt(self.path.display().to_string(), reason));
        }

        let aside = self.sibling(&format!(".corrupt-{}", chrono::Utc::now().timestamp_millis()));
        tokio::fs::rename(&self.path, &aside)
            .await
            .map_err(|e| DbError::io(self.path.display(), e))?;

        warn!(
            path = %self.path.display(),
            preserved = %aside.display(),
            reason,
            "Stored document is corrupt, starting from an empty document"
        );
        Ok(())
    }

    async fn stored_revision(&self) -> DbResult<u64> {
        let Some(bytes) = self.read_bytes().await? else {
            return Ok(0);
        };
        match serde_json::from_slice::<StoredRevision>(&bytes) {
            Ok(stored) => Ok(stored.revision),
            Err(err) => {
                self.quarantine(&err.to_string()).await?;
                Ok(0)
            }
        }
    }

    async fn write_atomic(&self, bytes: &[u8]) -> DbResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DbError::io(parent.display(), e))?;
        }

        let tmp = self.sibling(".tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| DbError::io(tmp.display(), e))?;

        if let Err(err) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(DbError::io(self.path.display(), err));
        }
        Ok(())
    }

    async fn write_revision(&self, doc: &Document, expected: u64) -> DbResult<()> {
        let _guard = self.write_lock.lock().await;

        let found = self.stored_revision().await?;
        if found != expected {
            return Err(DbError::RevisionConflict { expected, found });
        }

        let bytes = doc.to_vec_pretty()?;
        self.write_atomic(&bytes).await?;
        debug!(path = %self.path.display(), revision = doc.revision, bytes = bytes.len(), "Document written");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    fn backend(&self) -> Backend {
        Backend::Json
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> DbResult<Document> {
        let Some(bytes) = self.read_bytes().await? else {
            return Ok(Document::default());
        };
        match Document::from_slice(&bytes) {
            Ok(doc) => Ok(doc),
            Err(err) => {
                self.quarantine(&err.to_string()).await?;
                Ok(Document::default())
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
        // A missing file is fine; the first save creates it.
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.is_file(),
            Err(err) => err.kind() == ErrorKind::NotFound,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use shoplink_core::Shop;

    fn store_in(dir: &tempfile::TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("nested").join("shoplink.json"))
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let doc = store_in(&dir).load().await.unwrap();
        assert_eq!(doc, Document::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut doc = store.load().await.unwrap();
        doc.shops.put(Shop::new("S1", 5));
        store.save(&mut doc).await.unwrap();
        assert_eq!(doc.revision, 1);

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, doc);
        assert!(!store.sibling(".tmp").exists());
    }

    #[tokio::test]
    async fn test_stale_save_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut first = store.load().await.unwrap();
        let mut second = store.load().await.unwrap();

        first.shops.put(Shop::new("S1", 1));
        store.save(&mut first).await.unwrap();

        second.shops.put(Shop::new("S2", 2));
        let err = store.save(&mut second).await.unwrap_err();
        assert!(matches!(err, DbError::RevisionConflict { expected: 0, found: 1 }));
        assert_eq!(second.revision, 0);

        let stored = store.load().await.unwrap();
        assert!(stored.shop("S1").is_some());
        assert!(stored.shop("S2").is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shoplink.json");
        std::fs::write(&path, b"{\"shops\": [").unwrap();

        let store = JsonFileStore::new(&path);
        let doc = store.load().await.unwrap();
        assert_eq!(doc, Document::default());
        assert!(!path.exists());

        let preserved: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(preserved.len(), 1);
        assert_eq!(std::fs::read(preserved[0].path()).unwrap(), b"{\"shops\": [");
    }

    #[tokio::test]
    async fn test_strict_load_fails_on_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shoplink.json");
        std::fs::write(&path, b"[1, 2, 3]").unwrap();

        let store = JsonFileStore::new(&path).strict_load(true);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, DbError::Corrupt { .. }));
        assert!(path.exists());
    }
}
