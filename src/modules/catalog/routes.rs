//! JSON routes for the catalog, mounted under `/api/catalog`.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use catalog_db::RecordId;
use catalog_http::error::AppError;
use serde_json::{json, Value};

use super::controller::Catalog;
use super::dispatch::{Action, Operation, Outcome};
use super::integrity::Dependents;
use super::models::EntityKind;
use super::reads::View;
use super::validation::RawInput;

pub fn router(catalog: Catalog) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/{kind}", get(list))
        .route("/{kind}/create", get(create_form).post(create))
        .route("/{kind}/{id}", get(detail))
        .route("/{kind}/{id}/update", get(update_form).post(update))
        .route("/{kind}/{id}/delete", get(delete_form).post(delete))
        .with_state(catalog)
}

fn parse_kind(name: &str) -> Result<EntityKind, AppError> {
    name.parse()
        .map_err(|_| AppError::not_found(format!("unknown record kind '{name}'")))
}

fn dependent_details(dependents: &Dependents) -> Vec<Value> {
    match dependents {
        Dependents::Works(works) => works.iter().map(View::view).collect(),
        Dependents::Copies(copies) => copies.iter().map(View::view).collect(),
    }
}

/// Map a controller outcome onto an HTTP response.
fn respond(outcome: Outcome) -> Result<Response, AppError> {
    match outcome {
        Outcome::Rendered { view, data } => Ok(Json(json!({ "view": view, "data": data })).into_response()),
        Outcome::Redirected(target) => {
            Ok((StatusCode::SEE_OTHER, [(header::LOCATION, target.url())]).into_response())
        }
        Outcome::NotFound => Err(AppError::not_found("record not found")),
        Outcome::ValidationFailed { draft, errors } => {
            let details = errors
                .iter()
                .map(|error| json!(error))
                .collect::<Vec<_>>();
            Err(AppError::validation(details, "submitted record is invalid").with_draft(json!(draft)))
        }
        Outcome::IntegrityBlocked(dependents) => Err(AppError::conflict(
            dependent_details(&dependents),
            format!("record is still referenced by {} other record(s)", dependents.len()),
        )),
        Outcome::InternalError(err) => Err(AppError::Internal(anyhow::Error::new(err))),
    }
}

async fn perform(
    catalog: &Catalog,
    kind: EntityKind,
    action: Action,
    input: RawInput,
    id: Option<String>,
) -> Result<Response, AppError> {
    let id = id.map(RecordId::from);
    respond(
        catalog
            .perform(Operation::Entity(kind, action), &input, id.as_ref())
            .await,
    )
}

async fn index(State(catalog): State<Catalog>) -> Result<Response, AppError> {
    respond(catalog.index().await)
}

async fn list(
    State(catalog): State<Catalog>,
    Path(collection): Path<String>,
) -> Result<Response, AppError> {
    let kind = EntityKind::from_collection(&collection)
        .ok_or_else(|| AppError::not_found(format!("unknown collection '{collection}'")))?;
    perform(&catalog, kind, Action::List, RawInput::new(), None).await
}

async fn create_form(
    State(catalog): State<Catalog>,
    Path(kind): Path<String>,
) -> Result<Response, AppError> {
    perform(&catalog, parse_kind(&kind)?, Action::CreateForm, RawInput::new(), None).await
}

async fn create(
    State(catalog): State<Catalog>,
    Path(kind): Path<String>,
    Json(input): Json<RawInput>,
) -> Result<Response, AppError> {
    perform(&catalog, parse_kind(&kind)?, Action::Create, input, None).await
}

async fn detail(
    State(catalog): State<Catalog>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    perform(&catalog, parse_kind(&kind)?, Action::Detail, RawInput::new(), Some(id)).await
}

async fn update_form(
    State(catalog): State<Catalog>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    perform(&catalog, parse_kind(&kind)?, Action::UpdateForm, RawInput::new(), Some(id)).await
}

async fn update(
    State(catalog): State<Catalog>,
    Path((kind, id)): Path<(String, String)>,
    Json(input): Json<RawInput>,
) -> Result<Response, AppError> {
    perform(&catalog, parse_kind(&kind)?, Action::Update, input, Some(id)).await
}

async fn delete_form(
    State(catalog): State<Catalog>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    perform(&catalog, parse_kind(&kind)?, Action::DeleteForm, RawInput::new(), Some(id)).await
}

async fn delete(
    State(catalog): State<Catalog>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    perform(&catalog, parse_kind(&kind)?, Action::Delete, RawInput::new(), Some(id)).await
}
