//! In-memory document store.
//!
//! Behaves like the remote store for everything the engine relies on:
//! store-assigned keys, shallow field patches, atomic batches that reject on a
//! missing `Update` target. Faults can be injected to exercise the resync path.

use async_trait::async_trait;
use leadflow_core::{LeadflowError, LeadflowResult, StorageError};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use uuid::Uuid;

use crate::{DocumentStore, DocumentWrite, Fields, RawDocument, WriteMode};

type Collections = HashMap<String, BTreeMap<String, Fields>>;

/// In-memory store for tests and local development.
///
/// Cloning shares the underlying data, so a test can keep a handle for
/// inspection while the engine owns another.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
    offline: Arc<AtomicBool>,
    failing_batches: Arc<AtomicUsize>,
    batch_commits: Arc<AtomicUsize>,
    write_delay_ms: Arc<AtomicU64>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a document under a caller-chosen key, replacing any existing one.
    pub fn seed(&self, collection: &str, id: &str, fields: Fields) -> LeadflowResult<()> {
        self.write_lock()?
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Ok(())
    }

    /// Snapshot of one document's fields.
    pub fn document(&self, collection: &str, id: &str) -> Option<Fields> {
        self.read_lock()
            .ok()?
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.read_lock()
            .map(|c| c.get(collection).map_or(0, |docs| docs.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// While offline every call fails with `StorageError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Reject the next `n` batch writes.
    pub fn fail_next_batches(&self, n: usize) {
        self.failing_batches.store(n, Ordering::SeqCst);
    }

    /// Number of batches that have been committed.
    pub fn batch_commits(&self) -> usize {
        self.batch_commits.load(Ordering::SeqCst)
    }

    /// Delay applied to every write before it touches the data.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn read_lock(&self) -> LeadflowResult<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|_| LeadflowError::Storage(StorageError::LockPoisoned))
    }

    fn write_lock(&self) -> LeadflowResult<RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| LeadflowError::Storage(StorageError::LockPoisoned))
    }

    fn ensure_online(&self) -> LeadflowResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LeadflowError::Storage(StorageError::Unavailable {
                reason: "store offline".to_string(),
            }));
        }
        Ok(())
    }

    async fn write_delay(&self) {
        let ms = self.write_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn patch(target: &mut Fields, fields: Fields) {
    for (key, value) in fields {
        target.insert(key, value);
    }
}

fn to_raw(id: &str, fields: &Fields) -> RawDocument {
    RawDocument::new(id, fields.clone())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_all(&self, collection: &str) -> LeadflowResult<Vec<RawDocument>> {
        self.ensure_online()?;
        let collections = self.read_lock()?;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().map(|(id, f)| to_raw(id, f)).collect())
            .unwrap_or_default())
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> LeadflowResult<Option<RawDocument>> {
        self.ensure_online()?;
        let collections = self.read_lock()?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|f| to_raw(id, f)))
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> LeadflowResult<Vec<RawDocument>> {
        self.ensure_online()?;
        let collections = self.read_lock()?;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, f)| f.get(field) == Some(value))
                    .map(|(id, f)| to_raw(id, f))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, fields: Fields) -> LeadflowResult<String> {
        self.ensure_online()?;
        self.write_delay().await;
        let id = Uuid::now_v7().simple().to_string();
        let mut collections = self.write_lock()?;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(&id) {
            return Err(LeadflowError::Storage(StorageError::InsertFailed {
                collection: collection.to_string(),
                reason: "key collision".to_string(),
            }));
        }
        docs.insert(id.clone(), fields);
        Ok(id)
    }

    async fn update_fields(&self, collection: &str, id: &str, fields: Fields) -> LeadflowResult<()> {
        self.ensure_online()?;
        self.write_delay().await;
        let mut collections = self.write_lock()?;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| {
                LeadflowError::Storage(StorageError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })
            })?;
        patch(doc, fields);
        Ok(())
    }

    async fn batch_write(&self, collection: &str, writes: Vec<DocumentWrite>) -> LeadflowResult<()> {
        self.ensure_online()?;
        self.write_delay().await;
        let size = writes.len();
        if self.take_injected_failure() {
            return Err(LeadflowError::Storage(StorageError::BatchFailed {
                collection: collection.to_string(),
                size,
                reason: "injected failure".to_string(),
            }));
        }

        let mut collections = self.write_lock()?;
        let docs = collections.entry(collection.to_string()).or_default();

        // All-or-nothing: reject before touching anything.
        if let Some(missing) = writes
            .iter()
            .find(|w| w.mode == WriteMode::Update && !docs.contains_key(&w.id))
        {
            return Err(LeadflowError::Storage(StorageError::BatchFailed {
                collection: collection.to_string(),
                size,
                reason: format!("no document to update: {}", missing.id),
            }));
        }

        for write in writes {
            patch(docs.entry(write.id).or_default(), write.fields);
        }
        self.batch_commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn count(&self, collection: &str) -> LeadflowResult<usize> {
        self.ensure_online()?;
        Ok(self
            .read_lock()?
            .get(collection)
            .map_or(0, |docs| docs.len()))
    }

    async fn delete(&self, collection: &str, id: &str) -> LeadflowResult<()> {
        self.ensure_online()?;
        self.write_delay().await;
        if let Some(docs) = self.write_lock()?.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_distinct_keys() {
        let store = InMemoryDocumentStore::new();
        let a = store.insert("leads", fields(json!({"status": "New"}))).await.unwrap();
        let b = store.insert("leads", fields(json!({"status": "New"}))).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len("leads"), 2);
    }

    #[tokio::test]
    async fn test_update_fields_patches_shallowly() {
        let store = InMemoryDocumentStore::new();
        store
            .seed("leads", "a", fields(json!({"status": "New", "position": 1})))
            .unwrap();
        store
            .update_fields("leads", "a", fields(json!({"position": 4})))
            .await
            .unwrap();
        let doc = store.document("leads", "a").unwrap();
        assert_eq!(doc["status"], "New");
        assert_eq!(doc["position"], 4);
    }

    #[tokio::test]
    async fn test_update_fields_missing_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .update_fields("leads", "ghost", Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LeadflowError::Storage(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_batch_update_is_atomic_on_missing_target() {
        let store = InMemoryDocumentStore::new();
        store.seed("leads", "a", fields(json!({"position": 1}))).unwrap();
        let writes = vec![
            DocumentWrite::update("a", fields(json!({"position": 9}))),
            DocumentWrite::update("gone", fields(json!({"position": 2}))),
        ];
        let err = store.batch_write("leads", writes).await.unwrap_err();
        assert!(matches!(
            err,
            LeadflowError::Storage(StorageError::BatchFailed { size: 2, .. })
        ));
        assert_eq!(store.document("leads", "a").unwrap()["position"], 1);
        assert_eq!(store.batch_commits(), 0);
    }

    #[tokio::test]
    async fn test_batch_merge_creates_missing() {
        let store = InMemoryDocumentStore::new();
        let writes = vec![DocumentWrite::merge("new", fields(json!({"position": 2})))];
        store.batch_write("leads", writes).await.unwrap();
        assert_eq!(store.document("leads", "new").unwrap()["position"], 2);
        assert_eq!(store.batch_commits(), 1);
    }

    #[tokio::test]
    async fn test_injected_batch_failure_is_consumed() {
        let store = InMemoryDocumentStore::new();
        store.seed("leads", "a", Fields::new()).unwrap();
        store.fail_next_batches(1);
        let write = || vec![DocumentWrite::update("a", fields(json!({"position": 3})))];
        assert!(store.batch_write("leads", write()).await.is_err());
        assert!(store.batch_write("leads", write()).await.is_ok());
    }

    #[tokio::test]
    async fn test_offline_store_rejects_reads() {
        let store = InMemoryDocumentStore::new();
        store.set_offline(true);
        let err = store.get_all("leads").await.unwrap_err();
        assert!(matches!(
            err,
            LeadflowError::Storage(StorageError::Unavailable { .. })
        ));
        store.set_offline(false);
        assert!(store.get_all("leads").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_eq_filters_on_field() {
        let store = InMemoryDocumentStore::new();
        store.seed("leads", "a", fields(json!({"status": "New"}))).unwrap();
        store.seed("leads", "b", fields(json!({"status": "Qualified"}))).unwrap();
        let hits = store
            .query_eq("leads", "status", &json!("Qualified"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn test_count_scopes_to_collection() {
        let store = InMemoryDocumentStore::new();
        assert_eq!(store.count("leads").await.unwrap(), 0);
        store.seed("leads", "a", Fields::new()).unwrap();
        store.seed("leads", "b", Fields::new()).unwrap();
        store.seed("archive", "c", Fields::new()).unwrap();
        assert_eq!(store.count("leads").await.unwrap(), 2);
        store.set_offline(true);
        assert!(store.count("leads").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = InMemoryDocumentStore::new();
        assert!(store.delete("leads", "nothing").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_delay_applies_to_batches() {
        let store = InMemoryDocumentStore::new();
        store.seed("leads", "a", Fields::new()).unwrap();
        store.set_write_delay(Duration::from_millis(200));
        let started = tokio::time::Instant::now();
        store
            .batch_write("leads", vec![DocumentWrite::update("a", Fields::new())])
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
