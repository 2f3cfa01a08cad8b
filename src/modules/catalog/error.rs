use catalog_db::StorageError;
use thiserror::Error;

use super::controller::Phase;
use super::models::EntityKind;

/// Failures of the catalog core that are not domain outcomes.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to decode {kind} record: {source}")]
    Decode {
        kind: EntityKind,
        source: serde_json::Error,
    },

    #[error("failed to encode {kind} draft: {reason}")]
    Encode { kind: EntityKind, reason: String },

    #[error("lookup '{0}' is not part of this query")]
    UnknownLookup(&'static str),

    #[error("lookup '{key}' produced {found}, expected {expected}")]
    LookupShape {
        key: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("lookup task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("illegal mutation transition {from:?} -> {to:?}")]
    Transition { from: Phase, to: Phase },

    #[error("unknown entity kind '{0}'")]
    UnknownKind(String),

    #[error("unknown copy status '{0}'")]
    UnknownStatus(String),

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("operation '{0}' requires a record id")]
    MissingId(String),
}
