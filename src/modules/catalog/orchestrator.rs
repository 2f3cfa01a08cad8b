//! Aggregate query orchestration: fan out independent lookups, join them all.
//!
//! A [`Query`] names each lookup up front. [`Query::run`] spawns one task per
//! lookup, waits for every task to finish, and either hands back a keyed
//! [`Bundle`] or the first storage failure. Partial results are never exposed.

use std::collections::BTreeMap;
use std::sync::Arc;

use catalog_db::{Document, Filter, RecordId, Sort, Storage, StorageError};
use tokio::task::JoinSet;

use super::error::CatalogError;
use super::models::{decode, Entity, EntityKind};

#[derive(Debug, Clone)]
enum Lookup {
    ById(RecordId),
    Many(Filter, Option<Sort>),
    Count(Filter),
}

#[derive(Debug)]
enum Found {
    One(Option<Document>),
    Many(Vec<Document>),
    Count(u64),
}

impl Found {
    fn shape(&self) -> &'static str {
        match self {
            Found::One(_) => "a single record",
            Found::Many(_) => "a record list",
            Found::Count(_) => "a count",
        }
    }
}

async fn execute(
    storage: &dyn Storage,
    kind: EntityKind,
    lookup: Lookup,
) -> Result<Found, StorageError> {
    let collection = kind.collection();
    match lookup {
        Lookup::ById(id) => storage.find_by_id(collection, &id).await.map(Found::One),
        Lookup::Many(filter, sort) => storage
            .find_many(collection, &filter, sort.as_ref())
            .await
            .map(Found::Many),
        Lookup::Count(filter) => storage.count(collection, &filter).await.map(Found::Count),
    }
}

/// A set of named, independent lookups.
#[derive(Debug, Default)]
pub struct Query {
    lookups: BTreeMap<&'static str, (EntityKind, Lookup)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch one `T` by id; an unknown id yields `None`, not an error.
    pub fn by_id<T: Entity>(self, key: &'static str, id: &RecordId) -> Self {
        self.with(key, T::KIND, Lookup::ById(id.clone()))
    }

    pub fn many<T: Entity>(self, key: &'static str, filter: Filter, sort: Option<Sort>) -> Self {
        self.with(key, T::KIND, Lookup::Many(filter, sort))
    }

    pub fn count<T: Entity>(self, key: &'static str, filter: Filter) -> Self {
        self.with(key, T::KIND, Lookup::Count(filter))
    }

    /// Keys must be unique within one query.
    fn with(mut self, key: &'static str, kind: EntityKind, lookup: Lookup) -> Self {
        let previous = self.lookups.insert(key, (kind, lookup));
        debug_assert!(previous.is_none(), "lookup key `{key}` registered twice");
        self
    }

    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    /// Run every lookup concurrently and join them.
    ///
    /// All tasks run to completion even after one fails; the first failure
    /// observed is returned and every other result is dropped.
    pub async fn run(self, storage: &Arc<dyn Storage>) -> Result<Bundle, CatalogError> {
        let mut tasks = JoinSet::new();
        let mut kinds = BTreeMap::new();

        for (key, (kind, lookup)) in self.lookups {
            kinds.insert(key, kind);
            let storage = Arc::clone(storage);
            tasks.spawn(async move { (key, execute(storage.as_ref(), kind, lookup).await) });
        }
        tracing::debug!(lookups = kinds.len(), "lookups dispatched");

        let mut results = BTreeMap::new();
        let mut failure: Option<CatalogError> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, Ok(found))) => {
                    results.insert(key, found);
                }
                Ok((key, Err(err))) => {
                    tracing::warn!(lookup = key, error = %err, "lookup failed");
                    if failure.is_none() {
                        failure = Some(CatalogError::Storage(err));
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "lookup task aborted");
                    if failure.is_none() {
                        failure = Some(CatalogError::Task(err));
                    }
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        let results = results
            .into_iter()
            .map(|(key, found)| (key, (kinds[key], found)))
            .collect();
        Ok(Bundle { results })
    }
}

/// Joined results of a [`Query`], retrieved by key.
#[derive(Debug)]
pub struct Bundle {
    results: BTreeMap<&'static str, (EntityKind, Found)>,
}

impl Bundle {
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.results.keys().copied()
    }

    fn take(&mut self, key: &'static str, kind: EntityKind) -> Result<Found, CatalogError> {
        let (stored_kind, found) = self
            .results
            .remove(key)
            .ok_or(CatalogError::UnknownLookup(key))?;
        if stored_kind != kind {
            return Err(CatalogError::LookupShape {
                key,
                expected: kind.name(),
                found: stored_kind.name(),
            });
        }
        Ok(found)
    }

    /// Take a by-id result out of the bundle.
    pub fn take_one<T: Entity>(&mut self, key: &'static str) -> Result<Option<T>, CatalogError> {
        match self.take(key, T::KIND)? {
            Found::One(doc) => doc.map(decode::<T>).transpose(),
            other => Err(CatalogError::LookupShape {
                key,
                expected: "a single record",
                found: other.shape(),
            }),
        }
    }

    /// Take a filtered result out of the bundle.
    pub fn take_many<T: Entity>(&mut self, key: &'static str) -> Result<Vec<T>, CatalogError> {
        match self.take(key, T::KIND)? {
            Found::Many(docs) => docs.into_iter().map(decode::<T>).collect(),
            other => Err(CatalogError::LookupShape {
                key,
                expected: "a record list",
                found: other.shape(),
            }),
        }
    }

    pub fn count(&self, key: &'static str) -> Result<u64, CatalogError> {
        match self.results.get(key) {
            Some((_, Found::Count(count))) => Ok(*count),
            Some((_, other)) => Err(CatalogError::LookupShape {
                key,
                expected: "a count",
                found: other.shape(),
            }),
            None => Err(CatalogError::UnknownLookup(key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::catalog::models::{Genre, PhysicalCopy, Work};
    use crate::modules::catalog::testing::{doc, FaultyStorage};
    use catalog_db::MemoryStorage;
    use serde_json::json;

    async fn seeded() -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new());
        for name in ["Poetry", "Drama"] {
            storage
                .insert("genres", doc(json!({"name": name})))
                .await
                .unwrap();
        }
        storage
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "registered twice")]
    fn reusing_a_lookup_key_is_caught() {
        let _ = Query::new()
            .count::<Genre>("total", Filter::all())
            .count::<Work>("total", Filter::all());
    }

    #[tokio::test]
    async fn joins_every_named_lookup() {
        let memory = seeded().await;
        let poetry = memory
            .find_many("genres", &Filter::eq("name", "Poetry"), None)
            .await
            .unwrap()
            .remove(0);
        let poetry_id = RecordId::from(poetry["id"].as_str().unwrap());
        let storage: Arc<dyn Storage> = memory;

        let mut bundle = Query::new()
            .by_id::<Genre>("genre", &poetry_id)
            .by_id::<Genre>("missing", &RecordId::from("nope"))
            .many::<Genre>("genres", Filter::all(), Some(Sort::ascending("name")))
            .count::<Genre>("genre_count", Filter::all())
            .run(&storage)
            .await
            .unwrap();

        assert_eq!(bundle.count("genre_count").unwrap(), 2);
        assert_eq!(bundle.take_one::<Genre>("genre").unwrap().unwrap().name, "Poetry");
        assert!(bundle.take_one::<Genre>("missing").unwrap().is_none());
        let names: Vec<_> = bundle
            .take_many::<Genre>("genres")
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, ["Drama", "Poetry"]);
    }

    #[tokio::test]
    async fn one_failing_lookup_fails_the_bundle() {
        let faulty = Arc::new(FaultyStorage::failing_on(seeded().await, "copies"));
        let storage: Arc<dyn Storage> = faulty.clone();

        let result = Query::new()
            .count::<Genre>("genre_count", Filter::all())
            .many::<Work>("works", Filter::all(), None)
            .count::<PhysicalCopy>("copy_count", Filter::all())
            .run(&storage)
            .await;

        assert!(matches!(
            result,
            Err(CatalogError::Storage(StorageError::Unavailable(_)))
        ));
        // Every lookup was still issued and joined.
        assert_eq!(faulty.reads(), 3);
    }

    #[tokio::test]
    async fn typed_access_is_checked() {
        let storage: Arc<dyn Storage> = seeded().await;
        let mut bundle = Query::new()
            .count::<Genre>("genre_count", Filter::all())
            .many::<Genre>("genres", Filter::all(), None)
            .run(&storage)
            .await
            .unwrap();

        assert!(matches!(
            bundle.take_many::<Work>("genres"),
            Err(CatalogError::LookupShape { .. })
        ));
        assert!(matches!(
            bundle.take_one::<Genre>("genre_count"),
            Err(CatalogError::LookupShape { .. })
        ));
        assert!(matches!(
            bundle.count("nothing"),
            Err(CatalogError::UnknownLookup("nothing"))
        ));
    }

    #[tokio::test]
    async fn empty_query_yields_empty_bundle() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let bundle = Query::new().run(&storage).await.unwrap();
        assert_eq!(bundle.keys().count(), 0);
    }
}
