//! In-memory document engine.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::{NoContext, Timestamp, Uuid};

use crate::{Document, Filter, RecordId, Sort, Storage, StorageError, ID_FIELD};

/// Collections of JSON documents kept in insertion order.
#[derive(Default)]
pub struct MemoryStorage {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load collections from a JSON file shaped as
    /// `{ "<collection>": [ { "id": "...", ... }, ... ] }`.
    ///
    /// Documents without an `id` are assigned one.
    pub async fn from_snapshot(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let parsed: HashMap<String, Vec<Value>> = serde_json::from_str(&raw)?;

        let mut collections = HashMap::with_capacity(parsed.len());
        for (collection, values) in parsed {
            let mut documents = Vec::with_capacity(values.len());
            for value in values {
                let Value::Object(mut doc) = value else {
                    return Err(StorageError::NotAnObject { collection });
                };
                if !matches!(doc.get(ID_FIELD), Some(Value::String(_))) {
                    doc.insert(ID_FIELD.to_string(), Value::String(next_id().to_string()));
                }
                documents.push(doc);
            }
            tracing::debug!(
                target: "catalog-db",
                collection = %collection,
                documents = documents.len(),
                "snapshot collection loaded"
            );
            collections.insert(collection, documents);
        }

        Ok(Self {
            collections: RwLock::new(collections),
        })
    }
}

fn next_id() -> RecordId {
    RecordId::new(Uuid::new_v7(Timestamp::now(NoContext)).to_string())
}

fn has_id(doc: &Document, id: &RecordId) -> bool {
    matches!(doc.get(ID_FIELD), Some(Value::String(value)) if value == id.as_str())
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn find_by_id(
        &self,
        collection: &str,
        id: &RecordId,
    ) -> Result<Option<Document>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| has_id(doc, id)))
            .cloned())
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Document>, StorageError> {
        let collections = self.collections.read().await;
        let mut found: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(sort) = sort {
            // Stable, so ties keep insertion order.
            found.sort_by(|a, b| sort.compare(a, b));
        }
        Ok(found)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StorageError> {
        let collections = self.collections.read().await;
        let count = collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn insert(&self, collection: &str, mut draft: Document) -> Result<Document, StorageError> {
        let id = next_id();
        draft.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .push(draft.clone());

        tracing::debug!(target: "catalog-db", collection, id = %id, "document inserted");
        Ok(draft)
    }

    async fn replace(
        &self,
        collection: &str,
        id: &RecordId,
        mut draft: Document,
    ) -> Result<Option<Document>, StorageError> {
        draft.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        let mut collections = self.collections.write().await;
        let Some(slot) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| has_id(doc, id)))
        else {
            return Ok(None);
        };
        *slot = draft.clone();

        tracing::debug!(target: "catalog-db", collection, id = %id, "document replaced");
        Ok(Some(draft))
    }

    async fn remove(&self, collection: &str, id: &RecordId) -> Result<bool, StorageError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|doc| !has_id(doc, id));
        let removed = docs.len() != before;

        if removed {
            tracing::debug!(target: "catalog-db", collection, id = %id, "document removed");
        }
        Ok(removed)
    }
}
