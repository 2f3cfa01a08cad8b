//! Referential integrity checks.
//!
//! [`can_delete`] refuses to remove a record while others still point at it.
//! [`resolve_references`] is the opposite direction: it confirms that the
//! records a draft points at exist. Neither writes anything, and neither is
//! transactional with the write that follows; a dependent inserted between
//! the check and the commit goes unnoticed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use catalog_db::{Filter, RecordId, Storage};
use serde::Serialize;

use super::error::CatalogError;
use super::models::{Author, Entity, EntityKind, Genre, PhysicalCopy, Reference, Work};
use super::orchestrator::{Bundle, Query};
use super::validation::FieldError;

/// Field on a work holding its genre ids.
pub const WORK_GENRES_FIELD: &str = "genres";
/// Field on a work holding its author id.
pub const WORK_AUTHOR_FIELD: &str = "author";
/// Field on a copy holding its work id.
pub const COPY_BOOK_FIELD: &str = "book";

/// Records still referencing a deletion target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "records", rename_all = "lowercase")]
pub enum Dependents {
    Works(Vec<Work>),
    Copies(Vec<PhysicalCopy>),
}

impl Dependents {
    pub fn len(&self) -> usize {
        match self {
            Dependents::Works(works) => works.len(),
            Dependents::Copies(copies) => copies.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<&RecordId> {
        match self {
            Dependents::Works(works) => works.iter().map(|w| &w.id).collect(),
            Dependents::Copies(copies) => copies.iter().map(|c| &c.id).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Deletion {
    Allowed,
    Blocked(Dependents),
}

/// Decide whether the record `kind`/`id` may be removed.
///
/// An absent target is `Allowed` so that repeated deletes succeed.
pub async fn can_delete(
    storage: &Arc<dyn Storage>,
    kind: EntityKind,
    id: &RecordId,
) -> Result<Deletion, CatalogError> {
    let deletion = match kind {
        EntityKind::Genre => {
            guard::<Genre, Work>(storage, id, WORK_GENRES_FIELD, Dependents::Works).await?
        }
        EntityKind::Author => {
            guard::<Author, Work>(storage, id, WORK_AUTHOR_FIELD, Dependents::Works).await?
        }
        EntityKind::Work => {
            guard::<Work, PhysicalCopy>(storage, id, COPY_BOOK_FIELD, Dependents::Copies).await?
        }
        EntityKind::Copy => Deletion::Allowed,
    };

    if let Deletion::Blocked(dependents) = &deletion {
        tracing::info!(
            kind = %kind,
            id = %id,
            dependents = dependents.len(),
            "delete blocked by dependents"
        );
    }
    Ok(deletion)
}

async fn guard<T: Entity, D: Entity>(
    storage: &Arc<dyn Storage>,
    id: &RecordId,
    field: &'static str,
    wrap: fn(Vec<D>) -> Dependents,
) -> Result<Deletion, CatalogError> {
    let mut bundle = Query::new()
        .by_id::<T>("target", id)
        .many::<D>("dependents", Filter::eq(field, id.as_str()), None)
        .run(storage)
        .await?;

    if bundle.take_one::<T>("target")?.is_none() {
        return Ok(Deletion::Allowed);
    }

    let dependents = bundle.take_many::<D>("dependents")?;
    if dependents.is_empty() {
        Ok(Deletion::Allowed)
    } else {
        Ok(Deletion::Blocked(wrap(dependents)))
    }
}

fn not_found_message(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Work => "Book not found.",
        EntityKind::Author => "Author not found.",
        EntityKind::Genre => "Genre not found.",
        EntityKind::Copy => "Copy not found.",
    }
}

/// Check that every referenced record exists.
///
/// Lookups are batched per kind and run concurrently. Each unresolved
/// reference becomes a [`FieldError`] on its referencing field, in the order
/// the references were given.
pub async fn resolve_references(
    storage: &Arc<dyn Storage>,
    references: &[Reference],
) -> Result<Vec<FieldError>, CatalogError> {
    if references.is_empty() {
        return Ok(Vec::new());
    }

    let mut wanted: BTreeMap<EntityKind, Vec<&str>> = BTreeMap::new();
    for reference in references {
        wanted
            .entry(reference.kind)
            .or_default()
            .push(reference.id.as_str());
    }

    let mut query = Query::new();
    for (kind, ids) in &wanted {
        let filter = Filter::any_of("id", ids.iter().copied());
        let key = kind.name();
        query = match kind {
            EntityKind::Work => query.many::<Work>(key, filter, None),
            EntityKind::Author => query.many::<Author>(key, filter, None),
            EntityKind::Genre => query.many::<Genre>(key, filter, None),
            EntityKind::Copy => query.many::<PhysicalCopy>(key, filter, None),
        };
    }
    let mut bundle = query.run(storage).await?;

    let mut found: BTreeSet<(EntityKind, RecordId)> = BTreeSet::new();
    for kind in wanted.keys() {
        let key = kind.name();
        match kind {
            EntityKind::Work => collect_ids::<Work>(&mut bundle, key, &mut found)?,
            EntityKind::Author => collect_ids::<Author>(&mut bundle, key, &mut found)?,
            EntityKind::Genre => collect_ids::<Genre>(&mut bundle, key, &mut found)?,
            EntityKind::Copy => collect_ids::<PhysicalCopy>(&mut bundle, key, &mut found)?,
        }
    }

    Ok(references
        .iter()
        .filter(|reference| !found.contains(&(reference.kind, reference.id.clone())))
        .map(|reference| {
            FieldError::new(
                reference.field,
                not_found_message(reference.kind),
                reference.id.as_str(),
            )
        })
        .collect())
}

fn collect_ids<T: Entity>(
    bundle: &mut Bundle,
    key: &'static str,
    found: &mut BTreeSet<(EntityKind, RecordId)>,
) -> Result<(), CatalogError> {
    for record in bundle.take_many::<T>(key)? {
        found.insert((T::KIND, record.id().clone()));
    }
    Ok(())
}
