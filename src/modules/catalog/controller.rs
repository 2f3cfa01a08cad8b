//! Mutation controller.
//!
//! Every create, update and delete walks the same state machine:
//!
//! ```text
//! Received -> Normalizing -> ValidationFailed
//!                         -> Validated -> IntegrityBlocked
//!                                      -> IntegrityOk -> Persisting -> Committed
//!                                                                   -> PersistFailed
//!                                                                   -> NotFound
//!                                      -> Committed          (idempotent create)
//! Normalizing | Validated -> LookupFailed                    (storage read failed)
//! ```
//!
//! Storage errors are surfaced unchanged and never retried here.

use std::sync::Arc;

use catalog_db::{RecordId, Storage};

use super::error::CatalogError;
use super::integrity::{can_delete, resolve_references, Deletion, Dependents};
use super::models::{decode, encode, Draft, Entity, EntityKind};
use super::validation::{FieldError, Fields, RawInput};

/// Position of one mutation in the controller's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    Normalizing,
    ValidationFailed,
    Validated,
    IntegrityBlocked,
    IntegrityOk,
    Persisting,
    PersistFailed,
    LookupFailed,
    NotFound,
    Committed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::ValidationFailed
                | Phase::IntegrityBlocked
                | Phase::PersistFailed
                | Phase::LookupFailed
                | Phase::NotFound
                | Phase::Committed
        )
    }

    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Received, Normalizing)
                | (Normalizing, ValidationFailed | Validated | LookupFailed)
                | (Validated, IntegrityBlocked | IntegrityOk | Committed | LookupFailed)
                | (IntegrityOk, Persisting)
                | (Persisting, PersistFailed | NotFound | Committed)
        )
    }
}

/// Tracks one mutation through [`Phase`]s, rejecting illegal transitions.
#[derive(Debug)]
pub struct Machine {
    kind: EntityKind,
    action: &'static str,
    trail: Vec<Phase>,
}

impl Machine {
    pub fn new(kind: EntityKind, action: &'static str) -> Self {
        Self {
            kind,
            action,
            trail: vec![Phase::Received],
        }
    }

    pub fn phase(&self) -> Phase {
        self.trail.last().copied().unwrap_or(Phase::Received)
    }

    pub fn trail(&self) -> &[Phase] {
        &self.trail
    }

    pub fn advance(&mut self, next: Phase) -> Result<(), CatalogError> {
        let from = self.phase();
        if !from.can_advance_to(next) {
            return Err(CatalogError::Transition { from, to: next });
        }
        tracing::debug!(
            kind = %self.kind,
            action = self.action,
            from = ?from,
            to = ?next,
            "mutation phase"
        );
        self.trail.push(next);
        Ok(())
    }

    /// Move to the failure terminal matching the current phase.
    fn fail(&mut self, err: &CatalogError) {
        let terminal = match self.phase() {
            Phase::Persisting => Phase::PersistFailed,
            _ => Phase::LookupFailed,
        };
        if self.advance(terminal).is_err() {
            // Already terminal or mid-transition: keep the trail as is.
            tracing::debug!(kind = %self.kind, phase = ?self.phase(), "failure after terminal phase");
        }
        tracing::error!(
            kind = %self.kind,
            action = self.action,
            phase = ?self.phase(),
            error = %err,
            "mutation failed"
        );
    }
}

/// Result of a create, update or delete.
#[derive(Debug)]
pub enum MutationOutcome<T> {
    /// The stored record (create, update) or `()` (delete).
    Committed(T),
    NotFound,
    /// Field errors plus the normalized input, for redisplay. Nothing was written.
    ValidationFailed {
        draft: Fields,
        errors: Vec<FieldError>,
    },
    IntegrityBlocked(Dependents),
    Failed(CatalogError),
}

impl<T> MutationOutcome<T> {
    pub fn committed(self) -> Option<T> {
        match self {
            MutationOutcome::Committed(value) => Some(value),
            _ => None,
        }
    }
}

enum Validated<D> {
    Draft(D),
    Rejected { draft: Fields, errors: Vec<FieldError> },
}

/// Entry point for catalog reads and writes over an explicit storage handle.
#[derive(Clone)]
pub struct Catalog {
    storage: Arc<dyn Storage>,
}

impl Catalog {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Validate and insert a new record.
    ///
    /// Drafts with an identity filter (genres) return the existing matching
    /// record instead of writing a duplicate.
    pub async fn create<D: Draft>(&self, input: &RawInput) -> MutationOutcome<D::Entity> {
        let mut machine = Machine::new(<D::Entity as Entity>::KIND, "create");
        match self.run_create::<D>(&mut machine, input).await {
            Ok(outcome) => outcome,
            Err(err) => {
                machine.fail(&err);
                MutationOutcome::Failed(err)
            }
        }
    }

    /// Validate and replace the record stored under `id`, keeping the id.
    pub async fn update<D: Draft>(
        &self,
        id: &RecordId,
        input: &RawInput,
    ) -> MutationOutcome<D::Entity> {
        let mut machine = Machine::new(<D::Entity as Entity>::KIND, "update");
        match self.run_update::<D>(&mut machine, id, input).await {
            Ok(outcome) => outcome,
            Err(err) => {
                machine.fail(&err);
                MutationOutcome::Failed(err)
            }
        }
    }

    /// Remove a record unless other records still reference it.
    ///
    /// Removing an id that does not exist is a successful no-op.
    pub async fn delete(&self, kind: EntityKind, id: &RecordId) -> MutationOutcome<()> {
        let mut machine = Machine::new(kind, "delete");
        match self.run_delete(&mut machine, kind, id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                machine.fail(&err);
                MutationOutcome::Failed(err)
            }
        }
    }

    async fn validate<D: Draft>(
        &self,
        machine: &mut Machine,
        input: &RawInput,
    ) -> Result<Validated<D>, CatalogError> {
        machine.advance(Phase::Normalizing)?;

        let schema = D::schema();
        let mut normalized = schema.normalize(input);
        let candidate = D::from_fields(&normalized.fields);

        // Only references whose field is otherwise valid are worth resolving.
        let references: Vec<_> = candidate
            .references()
            .into_iter()
            .filter(|reference| !normalized.has_error(reference.field))
            .collect();
        let unresolved = resolve_references(&self.storage, &references).await?;
        schema.merge_errors(&mut normalized, unresolved);

        if !normalized.is_valid() {
            machine.advance(Phase::ValidationFailed)?;
            tracing::info!(
                kind = %machine.kind,
                action = machine.action,
                errors = normalized.errors.len(),
                "mutation rejected by validation"
            );
            return Ok(Validated::Rejected {
                draft: normalized.fields,
                errors: normalized.errors,
            });
        }

        machine.advance(Phase::Validated)?;
        Ok(Validated::Draft(candidate))
    }

    async fn run_create<D: Draft>(
        &self,
        machine: &mut Machine,
        input: &RawInput,
    ) -> Result<MutationOutcome<D::Entity>, CatalogError> {
        let draft = match self.validate::<D>(machine, input).await? {
            Validated::Draft(draft) => draft,
            Validated::Rejected { draft, errors } => {
                return Ok(MutationOutcome::ValidationFailed { draft, errors })
            }
        };
        let collection = machine.kind.collection();

        if let Some(filter) = draft.identity_filter() {
            let existing = self
                .storage
                .find_many(collection, &filter, None)
                .await?
                .into_iter()
                .next();
            if let Some(doc) = existing {
                let record: D::Entity = decode(doc)?;
                machine.advance(Phase::Committed)?;
                tracing::info!(
                    kind = %machine.kind,
                    id = %record.id(),
                    "create matched an existing record"
                );
                return Ok(MutationOutcome::Committed(record));
            }
        }

        machine.advance(Phase::IntegrityOk)?;
        machine.advance(Phase::Persisting)?;
        let stored = self.storage.insert(collection, encode(&draft)?).await?;
        let record: D::Entity = decode(stored)?;
        machine.advance(Phase::Committed)?;

        tracing::info!(kind = %machine.kind, id = %record.id(), "record created");
        Ok(MutationOutcome::Committed(record))
    }

    async fn run_update<D: Draft>(
        &self,
        machine: &mut Machine,
        id: &RecordId,
        input: &RawInput,
    ) -> Result<MutationOutcome<D::Entity>, CatalogError> {
        let draft = match self.validate::<D>(machine, input).await? {
            Validated::Draft(draft) => draft,
            Validated::Rejected { draft, errors } => {
                return Ok(MutationOutcome::ValidationFailed { draft, errors })
            }
        };

        machine.advance(Phase::IntegrityOk)?;
        machine.advance(Phase::Persisting)?;
        let replaced = self
            .storage
            .replace(machine.kind.collection(), id, encode(&draft)?)
            .await?;

        let Some(stored) = replaced else {
            machine.advance(Phase::NotFound)?;
            tracing::info!(kind = %machine.kind, id = %id, "update target not found");
            return Ok(MutationOutcome::NotFound);
        };
        let record: D::Entity = decode(stored)?;
        machine.advance(Phase::Committed)?;

        tracing::info!(kind = %machine.kind, id = %id, "record updated");
        Ok(MutationOutcome::Committed(record))
    }

    async fn run_delete(
        &self,
        machine: &mut Machine,
        kind: EntityKind,
        id: &RecordId,
    ) -> Result<MutationOutcome<()>, CatalogError> {
        machine.advance(Phase::Normalizing)?;
        if id.as_str().trim().is_empty() {
            machine.advance(Phase::ValidationFailed)?;
            return Ok(MutationOutcome::ValidationFailed {
                draft: Fields::default(),
                errors: vec![FieldError::new("id", "Record id must be specified.", "")],
            });
        }
        machine.advance(Phase::Validated)?;

        if let Deletion::Blocked(dependents) = can_delete(&self.storage, kind, id).await? {
            machine.advance(Phase::IntegrityBlocked)?;
            return Ok(MutationOutcome::IntegrityBlocked(dependents));
        }

        machine.advance(Phase::IntegrityOk)?;
        machine.advance(Phase::Persisting)?;
        let existed = self.storage.remove(kind.collection(), id).await?;
        machine.advance(Phase::Committed)?;

        tracing::info!(kind = %kind, id = %id, existed, "record deleted");
        Ok(MutationOutcome::Committed(()))
    }
}
