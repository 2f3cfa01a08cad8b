//! Library catalog: works, authors, genres and physical copies.

pub mod controller;
pub mod dispatch;
pub mod error;
pub mod integrity;
pub mod models;
pub mod orchestrator;
pub mod reads;
pub mod routes;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use catalog_db::Storage;
use catalog_kernel::{InitCtx, Module};
use serde_json::json;

pub use catalog_db::RecordId;
pub use controller::{Catalog, MutationOutcome, Phase};
pub use dispatch::{Action, Operation, Outcome, Target};
pub use error::CatalogError;
pub use integrity::{Deletion, Dependents};
pub use models::{
    Author, AuthorDraft, CopyDraft, CopyStatus, Draft, Entity, EntityKind, Genre, GenreDraft,
    PhysicalCopy, Work, WorkDraft,
};
pub use validation::{FieldError, Fields, RawInput, RawValue};

/// Catalog module mounted under `/api/catalog`
pub struct CatalogModule {
    catalog: Catalog,
}

impl CatalogModule {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            catalog: Catalog::new(storage),
        }
    }
}

#[async_trait]
impl Module for CatalogModule {
    fn name(&self) -> &'static str {
        "catalog"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            storage = ?ctx.settings.storage.engine,
            "catalog module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.catalog.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let counts = self.catalog.counts().await?;
        tracing::info!(module = self.name(), ?counts, "catalog module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "catalog module stopped");
        Ok(())
    }
}

fn error_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

fn rendered_response() -> serde_json::Value {
    json!({
        "description": "Rendered view data",
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/RenderedView" }
            }
        }
    })
}

fn kind_parameter() -> serde_json::Value {
    json!({
        "name": "kind",
        "in": "path",
        "required": true,
        "schema": { "type": "string", "enum": ["work", "author", "genre", "copy"] }
    })
}

fn id_parameter() -> serde_json::Value {
    json!({
        "name": "id",
        "in": "path",
        "required": true,
        "schema": { "type": "string" }
    })
}

fn submission_body() -> serde_json::Value {
    json!({
        "required": true,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/Submission" }
            }
        }
    })
}

fn redirect_response() -> serde_json::Value {
    json!({
        "description": "Committed; Location points at the record or its list",
        "headers": { "Location": { "schema": { "type": "string" } } }
    })
}

/// OpenAPI paths for the catalog routes, relative to `/api/catalog`.
fn openapi_fragment() -> serde_json::Value {
    json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "Catalog record counts",
                    "tags": ["Catalog"],
                    "responses": { "200": rendered_response(), "500": error_response("Storage failure") }
                }
            },
            "/{kind}": {
                "get": {
                    "summary": "List records of one collection (works, authors, genres, copies)",
                    "tags": ["Catalog"],
                    "parameters": [{
                        "name": "kind",
                        "in": "path",
                        "required": true,
                        "schema": { "type": "string", "enum": ["works", "authors", "genres", "copies"] }
                    }],
                    "responses": { "200": rendered_response(), "404": error_response("Unknown collection") }
                }
            },
            "/{kind}/create": {
                "get": {
                    "summary": "Data for the create form",
                    "tags": ["Catalog"],
                    "parameters": [kind_parameter()],
                    "responses": { "200": rendered_response() }
                },
                "post": {
                    "summary": "Create a record",
                    "tags": ["Catalog"],
                    "parameters": [kind_parameter()],
                    "requestBody": submission_body(),
                    "responses": {
                        "303": redirect_response(),
                        "422": error_response("Validation failed; the normalized draft is echoed back")
                    }
                }
            },
            "/{kind}/{id}": {
                "get": {
                    "summary": "Record detail",
                    "tags": ["Catalog"],
                    "parameters": [kind_parameter(), id_parameter()],
                    "responses": { "200": rendered_response(), "404": error_response("Record not found") }
                }
            },
            "/{kind}/{id}/update": {
                "get": {
                    "summary": "Data for the update form",
                    "tags": ["Catalog"],
                    "parameters": [kind_parameter(), id_parameter()],
                    "responses": { "200": rendered_response(), "404": error_response("Record not found") }
                },
                "post": {
                    "summary": "Replace a record, keeping its id",
                    "tags": ["Catalog"],
                    "parameters": [kind_parameter(), id_parameter()],
                    "requestBody": submission_body(),
                    "responses": {
                        "303": redirect_response(),
                        "404": error_response("Record not found"),
                        "422": error_response("Validation failed; the normalized draft is echoed back")
                    }
                }
            },
            "/{kind}/{id}/delete": {
                "get": {
                    "summary": "Data for the delete confirmation, with dependents",
                    "tags": ["Catalog"],
                    "parameters": [kind_parameter(), id_parameter()],
                    "responses": { "200": rendered_response(), "303": redirect_response() }
                },
                "post": {
                    "summary": "Delete a record unless others still reference it",
                    "tags": ["Catalog"],
                    "parameters": [kind_parameter(), id_parameter()],
                    "responses": {
                        "303": redirect_response(),
                        "409": error_response("Record is still referenced")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "RenderedView": {
                    "type": "object",
                    "properties": {
                        "view": { "type": "string" },
                        "data": { "type": "object" }
                    },
                    "required": ["view", "data"]
                },
                "Submission": {
                    "type": "object",
                    "description": "Raw field values; each is a string or a list of strings",
                    "additionalProperties": {
                        "oneOf": [
                            { "type": "string" },
                            { "type": "array", "items": { "type": "string" } }
                        ]
                    }
                }
            }
        }
    })
}

/// Create the catalog module over the given storage
pub fn create_module(storage: Arc<dyn Storage>) -> Arc<dyn Module> {
    Arc::new(CatalogModule::new(storage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_db::MemoryStorage;
    use catalog_kernel::settings::Settings;

    #[tokio::test]
    async fn lifecycle_hooks_succeed_on_empty_storage() {
        let module = create_module(Arc::new(MemoryStorage::new()));
        let settings = Settings::default();
        let ctx = InitCtx {
            settings: &settings,
        };

        module.init(&ctx).await.unwrap();
        module.start(&ctx).await.unwrap();
        module.stop().await.unwrap();
        assert_eq!(module.name(), "catalog");
    }

    #[test]
    fn openapi_fragment_covers_every_route() {
        let fragment = openapi_fragment();
        let paths = fragment["paths"].as_object().unwrap();
        for path in ["/", "/{kind}", "/{kind}/create", "/{kind}/{id}", "/{kind}/{id}/update", "/{kind}/{id}/delete"] {
            assert!(paths.contains_key(path), "missing {path}");
        }
    }
}
