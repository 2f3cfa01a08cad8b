//! Named catalog operations and their presentation-facing outcomes.
//!
//! Operation names are `catalog_index` or `<kind>_<action>`, for example
//! `genre_create`, `work_update_form` or `copy_delete`.

use std::fmt;
use std::str::FromStr;

use catalog_db::RecordId;
use serde::Serialize;

use super::controller::{Catalog, MutationOutcome};
use super::error::CatalogError;
use super::integrity::Dependents;
use super::models::{AuthorDraft, CopyDraft, Entity, EntityKind, GenreDraft, WorkDraft};
use super::validation::{FieldError, Fields, RawInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Detail,
    CreateForm,
    Create,
    UpdateForm,
    Update,
    DeleteForm,
    Delete,
}

impl Action {
    const ALL: [Action; 8] = [
        Action::List,
        Action::Detail,
        Action::CreateForm,
        Action::Create,
        Action::UpdateForm,
        Action::Update,
        Action::DeleteForm,
        Action::Delete,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Detail => "detail",
            Action::CreateForm => "create_form",
            Action::Create => "create",
            Action::UpdateForm => "update_form",
            Action::Update => "update",
            Action::DeleteForm => "delete_form",
            Action::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Index,
    Entity(EntityKind, Action),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Index => f.write_str("catalog_index"),
            Operation::Entity(kind, action) => write!(f, "{}_{}", kind.name(), action.name()),
        }
    }
}

impl FromStr for Operation {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "catalog_index" {
            return Ok(Operation::Index);
        }
        let unknown = || CatalogError::UnknownOperation(value.to_string());
        let (kind, action) = value.split_once('_').ok_or_else(unknown)?;
        let kind: EntityKind = kind.parse().map_err(|_| unknown())?;
        let action = Action::ALL
            .into_iter()
            .find(|candidate| candidate.name() == action)
            .ok_or_else(unknown)?;
        Ok(Operation::Entity(kind, action))
    }
}

/// Where a successful mutation sends the caller next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "target", rename_all = "lowercase")]
pub enum Target {
    Record { kind: EntityKind, id: RecordId },
    List { kind: EntityKind },
}

impl Target {
    pub fn url(&self) -> String {
        match self {
            Target::Record { kind, id } => kind.record_url(id),
            Target::List { kind } => kind.list_url(),
        }
    }
}

/// Result of one catalog operation, for the presentation layer to render.
#[derive(Debug)]
pub enum Outcome {
    Rendered {
        view: &'static str,
        data: serde_json::Value,
    },
    Redirected(Target),
    NotFound,
    ValidationFailed {
        draft: Fields,
        errors: Vec<FieldError>,
    },
    IntegrityBlocked(Dependents),
    InternalError(CatalogError),
}

impl Outcome {
    pub(crate) fn from_mutation<T>(
        outcome: MutationOutcome<T>,
        on_commit: impl FnOnce(T) -> Target,
    ) -> Self {
        match outcome {
            MutationOutcome::Committed(value) => Outcome::Redirected(on_commit(value)),
            MutationOutcome::NotFound => Outcome::NotFound,
            MutationOutcome::ValidationFailed { draft, errors } => {
                Outcome::ValidationFailed { draft, errors }
            }
            MutationOutcome::IntegrityBlocked(dependents) => Outcome::IntegrityBlocked(dependents),
            MutationOutcome::Failed(err) => Outcome::InternalError(err),
        }
    }
}

fn to_record<T: Entity>(record: T) -> Target {
    Target::Record {
        kind: T::KIND,
        id: record.id().clone(),
    }
}

impl Catalog {
    /// Run an operation by name.
    pub async fn dispatch(
        &self,
        operation: &str,
        input: &RawInput,
        id: Option<&RecordId>,
    ) -> Outcome {
        match operation.parse::<Operation>() {
            Ok(operation) => self.perform(operation, input, id).await,
            Err(err) => Outcome::InternalError(err),
        }
    }

    pub async fn perform(
        &self,
        operation: Operation,
        input: &RawInput,
        id: Option<&RecordId>,
    ) -> Outcome {
        tracing::debug!(%operation, id = ?id, "dispatching catalog operation");

        let (kind, action) = match operation {
            Operation::Index => return self.index().await,
            Operation::Entity(kind, action) => (kind, action),
        };

        match (action, id) {
            (Action::List, _) => self.list(kind).await,
            (Action::CreateForm, _) => self.create_form(kind).await,
            (Action::Create, _) => self.create_by_kind(kind, input).await,
            (Action::Detail, Some(id)) => self.detail(kind, id).await,
            (Action::UpdateForm, Some(id)) => self.update_form(kind, id).await,
            (Action::Update, Some(id)) => self.update_by_kind(kind, id, input).await,
            (Action::DeleteForm, Some(id)) => self.delete_form(kind, id).await,
            (Action::Delete, Some(id)) => {
                Outcome::from_mutation(self.delete(kind, id).await, |()| Target::List { kind })
            }
            (_, None) => Outcome::InternalError(CatalogError::MissingId(operation.to_string())),
        }
    }

    async fn create_by_kind(&self, kind: EntityKind, input: &RawInput) -> Outcome {
        match kind {
            EntityKind::Work => Outcome::from_mutation(self.create::<WorkDraft>(input).await, to_record),
            EntityKind::Author => {
                Outcome::from_mutation(self.create::<AuthorDraft>(input).await, to_record)
            }
            EntityKind::Genre => {
                Outcome::from_mutation(self.create::<GenreDraft>(input).await, to_record)
            }
            EntityKind::Copy => Outcome::from_mutation(self.create::<CopyDraft>(input).await, to_record),
        }
    }

    async fn update_by_kind(&self, kind: EntityKind, id: &RecordId, input: &RawInput) -> Outcome {
        match kind {
            EntityKind::Work => {
                Outcome::from_mutation(self.update::<WorkDraft>(id, input).await, to_record)
            }
            EntityKind::Author => {
                Outcome::from_mutation(self.update::<AuthorDraft>(id, input).await, to_record)
            }
            EntityKind::Genre => {
                Outcome::from_mutation(self.update::<GenreDraft>(id, input).await, to_record)
            }
            EntityKind::Copy => {
                Outcome::from_mutation(self.update::<CopyDraft>(id, input).await, to_record)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::catalog::validation::RawValue;
    use catalog_db::MemoryStorage;
    use std::sync::Arc;

    #[test]
    fn operation_names_parse() {
        assert_eq!("catalog_index".parse::<Operation>().unwrap(), Operation::Index);
        assert_eq!(
            "work_update_form".parse::<Operation>().unwrap(),
            Operation::Entity(EntityKind::Work, Action::UpdateForm)
        );
        assert_eq!(
            "copy_delete".parse::<Operation>().unwrap(),
            Operation::Entity(EntityKind::Copy, Action::Delete)
        );
        assert!("shelf_list".parse::<Operation>().is_err());
        assert!("genre_burn".parse::<Operation>().is_err());
        assert!("genre".parse::<Operation>().is_err());
    }

    #[test]
    fn operations_display_as_their_names() {
        for name in ["catalog_index", "author_delete_form", "genre_list"] {
            assert_eq!(name.parse::<Operation>().unwrap().to_string(), name);
        }
    }

    #[test]
    fn targets_render_urls() {
        let record = Target::Record {
            kind: EntityKind::Genre,
            id: RecordId::from("g1"),
        };
        assert_eq!(record.url(), "/api/catalog/genre/g1");
        assert_eq!(Target::List { kind: EntityKind::Author }.url(), "/api/catalog/authors");
    }

    #[tokio::test]
    async fn record_actions_require_an_id() {
        let catalog = Catalog::new(Arc::new(MemoryStorage::new()));
        let outcome = catalog.dispatch("genre_detail", &RawInput::new(), None).await;
        assert!(matches!(
            outcome,
            Outcome::InternalError(CatalogError::MissingId(ref op)) if op == "genre_detail"
        ));
    }

    #[tokio::test]
    async fn create_redirects_to_the_new_record() {
        let catalog = Catalog::new(Arc::new(MemoryStorage::new()));
        let input: RawInput = [("name".to_string(), RawValue::from("Satire"))]
            .into_iter()
            .collect();

        let outcome = catalog.dispatch("genre_create", &input, None).await;
        let Outcome::Redirected(Target::Record { kind, id }) = outcome else {
            panic!("expected redirect, got {outcome:?}");
        };
        assert_eq!(kind, EntityKind::Genre);

        let deleted = catalog.dispatch("genre_delete", &RawInput::new(), Some(&id)).await;
        assert!(matches!(
            deleted,
            Outcome::Redirected(Target::List { kind: EntityKind::Genre })
        ));
    }
}
