//! Typed view over one collection

use crate::error::{Result, StorageError};
use crate::store::{DocumentStore, Precondition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Attempts made by `Collection::modify` before giving up on conflicts
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// Decoded document with its version
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Typed collection handle
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            name: self.name,
            _marker: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: Arc<dyn DocumentStore>, name: &'static str) -> Self {
        Self {
            store,
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn get(&self, id: &str) -> Result<Option<Versioned<T>>> {
        match self.store.get(self.name, id).await? {
            Some(doc) => Ok(Some(Versioned {
                value: serde_json::from_value(doc.data)?,
                version: doc.version,
            })),
            None => Ok(None),
        }
    }

    /// Insert a new document, failing if the id is taken
    pub async fn create(&self, id: &str, value: &T) -> Result<u64> {
        let data = serde_json::to_value(value)?;
        self.store
            .put(self.name, id, data, Precondition::Absent)
            .await
            .map_err(|e| match e {
                StorageError::VersionConflict { collection, id } => StorageError::AlreadyExists { collection, id },
                other => other,
            })
    }

    /// Unconditional write
    pub async fn put(&self, id: &str, value: &T) -> Result<u64> {
        let data = serde_json::to_value(value)?;
        self.store.put(self.name, id, data, Precondition::Any).await
    }

    /// Write only if the stored version is still `version`
    pub async fn replace(&self, id: &str, value: &T, version: u64) -> Result<u64> {
        let data = serde_json::to_value(value)?;
        self.store.put(self.name, id, data, Precondition::Version(version)).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.store.delete(self.name, id).await
    }

    pub async fn list(&self) -> Result<Vec<Versioned<T>>> {
        self.store
            .list(self.name)
            .await?
            .into_iter()
            .map(|doc| {
                Ok(Versioned {
                    value: serde_json::from_value(doc.data)?,
                    version: doc.version,
                })
            })
            .collect()
    }

    /// Documents matching `filter`, values only
    pub async fn find<F>(&self, filter: F) -> Result<Vec<T>>
    where
        F: Fn(&T) -> bool + Send,
    {
        Ok(self
            .list()
            .await?
            .into_iter()
            .map(|v| v.value)
            .filter(|v| filter(v))
            .collect())
    }

    /// Read-modify-write with a version check
    ///
    /// `apply` receives the current value (`None` if absent) and returns the
    /// value to store. On a version conflict the document is re-read and
    /// `apply` runs again, up to `MAX_WRITE_ATTEMPTS` times. An error from
    /// `apply` aborts without writing.
    pub async fn modify<F, E>(&self, id: &str, mut apply: F) -> std::result::Result<Versioned<T>, E>
    where
        F: FnMut(Option<T>) -> std::result::Result<T, E> + Send,
        E: From<StorageError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.get(id).await?;
            let precondition = match &current {
                Some(v) => Precondition::Version(v.version),
                None => Precondition::Absent,
            };

            let next = apply(current.map(|v| v.value))?;
            let data = serde_json::to_value(&next).map_err(StorageError::from)?;

            match self.store.put(self.name, id, data, precondition).await {
                Ok(version) => return Ok(Versioned { value: next, version }),
                Err(e) if e.is_conflict() && attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(collection = self.name, id, attempt, "Write conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::Document;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        hits: u32,
    }

    fn counters(store: Arc<dyn DocumentStore>) -> Collection<Counter> {
        Collection::new(store, "counters")
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate() {
        let col = counters(Arc::new(MemoryStore::default()));
        col.create("a", &Counter { hits: 0 }).await.unwrap();

        let err = col.create("a", &Counter { hits: 1 }).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_modify_creates_and_updates() {
        let col = counters(Arc::new(MemoryStore::default()));

        for _ in 0..3 {
            col.modify::<_, StorageError>("a", |cur| {
                let mut c = cur.unwrap_or(Counter { hits: 0 });
                c.hits += 1;
                Ok(c)
            })
            .await
            .unwrap();
        }

        let stored = col.get("a").await.unwrap().unwrap();
        assert_eq!(stored.value.hits, 3);
        assert_eq!(stored.version, 3);
    }

    #[tokio::test]
    async fn test_concurrent_modify_loses_nothing() {
        let col = counters(Arc::new(MemoryStore::default()));
        col.create("a", &Counter { hits: 0 }).await.unwrap();

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let col = col.clone();
                tokio::spawn(async move {
                    col.modify::<_, StorageError>("a", |cur| {
                        let mut c = cur.unwrap_or(Counter { hits: 0 });
                        c.hits += 1;
                        Ok(c)
                    })
                    .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(col.get("a").await.unwrap().unwrap().value.hits, 2);
    }

    /// Store whose first N conditional writes always conflict
    struct FlakyStore {
        inner: MemoryStore,
        conflicts_left: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
            self.inner.get(collection, id).await
        }

        async fn put(&self, collection: &str, id: &str, data: serde_json::Value, pre: Precondition) -> Result<u64> {
            if pre != Precondition::Any && self.conflicts_left.load(Ordering::SeqCst) > 0 {
                self.conflicts_left.fetch_sub(1, Ordering::SeqCst);
                return Err(StorageError::VersionConflict {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            }
            self.inner.put(collection, id, data, pre).await
        }

        async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
            self.inner.delete(collection, id).await
        }

        async fn list(&self, collection: &str) -> Result<Vec<Document>> {
            self.inner.list(collection).await
        }
    }

    #[tokio::test]
    async fn test_modify_retries_then_gives_up() {
        let flaky = Arc::new(FlakyStore {
            inner: MemoryStore::default(),
            conflicts_left: AtomicUsize::new(MAX_WRITE_ATTEMPTS - 1),
        });
        let col = counters(flaky.clone());
        let bump = |cur: Option<Counter>| -> std::result::Result<Counter, StorageError> {
            Ok(Counter { hits: cur.map(|c| c.hits).unwrap_or(0) + 1 })
        };

        col.modify("a", bump).await.unwrap();

        flaky.conflicts_left.store(MAX_WRITE_ATTEMPTS, Ordering::SeqCst);
        let err = col.modify("a", bump).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(col.get("a").await.unwrap().unwrap().value.hits, 1);
    }

    #[tokio::test]
    async fn test_find_filters() {
        let col = counters(Arc::new(MemoryStore::default()));
        col.put("a", &Counter { hits: 1 }).await.unwrap();
        col.put("b", &Counter { hits: 5 }).await.unwrap();

        let big = col.find(|c| c.hits > 2).await.unwrap();
        assert_eq!(big, vec![Counter { hits: 5 }]);
    }
}
