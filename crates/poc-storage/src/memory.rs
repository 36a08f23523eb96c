//! In-memory document store with JSON snapshots
//!
//! All collections live behind one lock. A snapshot is the full contents
//! serialized as JSON, written to a temporary file and renamed over the
//! target so a crash never leaves a half-written snapshot.

use crate::error::{Result, StorageError};
use crate::store::{Document, DocumentStore, Precondition};
use async_trait::async_trait;
use parking_lot::RwLock;
use poc_core::{SharedClock, SystemClock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

type Collections = BTreeMap<String, BTreeMap<String, Document>>;

/// Snapshot file layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    collections: Collections,
}

/// In-memory store
pub struct MemoryStore {
    collections: RwLock<Collections>,
    clock: SharedClock,
}

impl MemoryStore {
    /// Empty store stamping writes with `clock`
    pub fn new(clock: SharedClock) -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Load from a snapshot file, or start empty if it does not exist
    pub fn open(path: &Path, clock: SharedClock) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No snapshot found, starting empty");
            return Ok(Self::new(clock));
        }

        let bytes = std::fs::read(path)?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        let documents: usize = snapshot.collections.values().map(|c| c.len()).sum();
        tracing::info!(path = %path.display(), documents, "Snapshot loaded");

        Ok(Self {
            collections: RwLock::new(snapshot.collections),
            clock,
        })
    }

    /// Write all collections to `path`
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            collections: self.collections.read().clone(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;

        tracing::debug!(path = %path.display(), "Snapshot written");
        Ok(())
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(SystemClock::shared())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        data: serde_json::Value,
        precondition: Precondition,
    ) -> Result<u64> {
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();

        let current = docs.get(id).map(|d| d.version);
        if !precondition.holds(current) {
            return Err(StorageError::VersionConflict {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        let version = current.unwrap_or(0) + 1;
        docs.insert(
            id.to_string(),
            Document {
                id: id.to_string(),
                version,
                updated_at: self.clock.now(),
                data,
            },
        );
        Ok(version)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self
            .collections
            .write()
            .get_mut(collection)
            .map(|c| c.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poc_core::ManualClock;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_bumps_version() {
        let store = MemoryStore::new(ManualClock::shared(100));

        let v1 = store.put("c", "a", json!({"n": 1}), Precondition::Absent).await.unwrap();
        let v2 = store.put("c", "a", json!({"n": 2}), Precondition::Version(1)).await.unwrap();
        assert_eq!((v1, v2), (1, 2));

        let doc = store.get("c", "a").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"n": 2}));
        assert_eq!(doc.updated_at, 100);
    }

    #[tokio::test]
    async fn test_stale_write_rejected() {
        let store = MemoryStore::default();
        store.put("c", "a", json!(1), Precondition::Any).await.unwrap();
        store.put("c", "a", json!(2), Precondition::Any).await.unwrap();

        let err = store.put("c", "a", json!(3), Precondition::Version(1)).await.unwrap_err();
        assert!(err.is_conflict());

        let err = store.put("c", "a", json!(3), Precondition::Absent).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.get("c", "a").await.unwrap().unwrap().data, json!(2));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = MemoryStore::default();
        store.put("c", "b", json!(2), Precondition::Any).await.unwrap();
        store.put("c", "a", json!(1), Precondition::Any).await.unwrap();

        let ids: Vec<_> = store.list("c").await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(store.delete("c", "a").await.unwrap());
        assert!(!store.delete("c", "a").await.unwrap());
        assert!(store.list("missing").await.unwrap().is_empty());
        assert_eq!(store.count("c"), 1);
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("store.json");

        let store = MemoryStore::default();
        store.put("courses", "1", json!({"title": "Rust"}), Precondition::Any).await.unwrap();
        store.put("courses", "1", json!({"title": "Rust 2"}), Precondition::Any).await.unwrap();
        store.save_snapshot(&path).unwrap();

        let reopened = MemoryStore::open(&path, SystemClock::shared()).unwrap();
        let doc = reopened.get("courses", "1").await.unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.data, json!({"title": "Rust 2"}));
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(&dir.path().join("none.json"), SystemClock::shared()).unwrap();
        assert_eq!(store.count("courses"), 0);
    }
}
