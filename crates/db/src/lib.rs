//! Storage gateway for the catalog.
//!
//! The catalog core talks to storage only through the [`Storage`] trait: a
//! small document-collection contract (find by id, find by filter, count,
//! insert, replace, remove). [`MemoryStorage`] is the bundled engine.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod filter;
pub mod memory;

pub use filter::{Direction, Filter, Sort};
pub use memory::MemoryStorage;

/// A stored record: a JSON object whose `id` field holds its [`RecordId`].
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Field under which every stored document carries its identifier.
pub const ID_FIELD: &str = "id";

/// Opaque identifier assigned by the gateway when a document is inserted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Failures raised by a storage engine.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("document for collection '{collection}' is not a JSON object")]
    NotAnObject { collection: String },

    #[error("failed to read snapshot: {0}")]
    Snapshot(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Document-collection contract the catalog core is written against.
///
/// Implementations must make each individual call atomic; nothing above this
/// trait takes locks across calls.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Fetch one document. An unknown id is `Ok(None)`, not an error.
    async fn find_by_id(
        &self,
        collection: &str,
        id: &RecordId,
    ) -> Result<Option<Document>, StorageError>;

    /// Fetch every document matching `filter`, optionally sorted.
    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Document>, StorageError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StorageError>;

    /// Store a new document and return it with its assigned `id`.
    async fn insert(&self, collection: &str, draft: Document) -> Result<Document, StorageError>;

    /// Replace the document stored under `id`, keeping the id.
    /// Returns `Ok(None)` when there is nothing to replace.
    async fn replace(
        &self,
        collection: &str,
        id: &RecordId,
        draft: Document,
    ) -> Result<Option<Document>, StorageError>;

    /// Remove the document stored under `id`. Returns whether one existed.
    async fn remove(&self, collection: &str, id: &RecordId) -> Result<bool, StorageError>;
}
