//! Storage doubles shared by the catalog unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use catalog_db::{Document, Filter, RecordId, Sort, Storage, StorageError};
use serde_json::Value;

pub(crate) fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Wraps a real engine, counting calls and failing on demand.
pub(crate) struct FaultyStorage {
    inner: Arc<dyn Storage>,
    failing_collection: Option<&'static str>,
    fail_writes: bool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl FaultyStorage {
    fn wrap(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            failing_collection: None,
            fail_writes: false,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Every call touching `collection` fails.
    pub(crate) fn failing_on(inner: Arc<dyn Storage>, collection: &'static str) -> Self {
        Self {
            failing_collection: Some(collection),
            ..Self::wrap(inner)
        }
    }

    /// Reads pass through; every write fails.
    pub(crate) fn failing_writes(inner: Arc<dyn Storage>) -> Self {
        Self {
            fail_writes: true,
            ..Self::wrap(inner)
        }
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn read(&self, collection: &str) -> Result<(), StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check(collection)
    }

    fn write(&self, collection: &str) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(StorageError::Unavailable(format!("write to {collection} refused")));
        }
        self.check(collection)
    }

    fn check(&self, collection: &str) -> Result<(), StorageError> {
        match self.failing_collection {
            Some(failing) if failing == collection => {
                Err(StorageError::Unavailable(format!("{collection} offline")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Storage for FaultyStorage {
    async fn find_by_id(
        &self,
        collection: &str,
        id: &RecordId,
    ) -> Result<Option<Document>, StorageError> {
        self.read(collection)?;
        self.inner.find_by_id(collection, id).await
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Document>, StorageError> {
        self.read(collection)?;
        self.inner.find_many(collection, filter, sort).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StorageError> {
        self.read(collection)?;
        self.inner.count(collection, filter).await
    }

    async fn insert(&self, collection: &str, draft: Document) -> Result<Document, StorageError> {
        self.write(collection)?;
        self.inner.insert(collection, draft).await
    }

    async fn replace(
        &self,
        collection: &str,
        id: &RecordId,
        draft: Document,
    ) -> Result<Option<Document>, StorageError> {
        self.write(collection)?;
        self.inner.replace(collection, id, draft).await
    }

    async fn remove(&self, collection: &str, id: &RecordId) -> Result<bool, StorageError> {
        self.write(collection)?;
        self.inner.remove(collection, id).await
    }
}
