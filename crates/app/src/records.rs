use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crm_core::listing::{list_page, ListFilter};
use crm_core::pipeline::Stage;
use crm_core::types::{Collection, Record};
use crm_core::validation::ValidationError;
use crm_storage::CollectionRepository;

use crate::problem::{parse_body, query_params, ProblemResponse};
use crate::router::AppState;
use crate::session::Authenticated;

/// Runs `$body` with `$repo` bound to the repository of `$collection`.
macro_rules! with_repository {
    ($state:expr, $collection:expr, |$repo:ident| $body:expr) => {
        match $collection {
            Collection::Customers => {
                let $repo = $state.storage().customers();
                $body
            }
            Collection::Deals => {
                let $repo = $state.storage().deals();
                $body
            }
            Collection::Employees => {
                let $repo = $state.storage().employees();
                $body
            }
            Collection::Tasks => {
                let $repo = $state.storage().tasks();
                $body
            }
        }
    };
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    page_size: Option<usize>,
}

impl ListQuery {
    fn filter(&self) -> Result<ListFilter, ProblemResponse> {
        let stage = match self.stage.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<Stage>().map_err(|err| {
                ProblemResponse::validation(ValidationError::field("stage", err.to_string()))
            })?),
        };
        Ok(ListFilter {
            search: self.search.clone(),
            status: self.status.clone().filter(|status| !status.trim().is_empty()),
            stage,
        })
    }
}

fn collection_named(name: &str) -> Result<Collection, ProblemResponse> {
    Collection::from_name(name)
        .ok_or_else(|| ProblemResponse::not_found(format!("unknown collection '{name}'")))
}

fn collection_of_kind(kind: &str) -> Result<Collection, ProblemResponse> {
    Collection::from_kind(kind)
        .ok_or_else(|| ProblemResponse::not_found(format!("unknown record kind '{kind}'")))
}

fn store_problem<T: Record>(err: crm_storage::RepositoryError) -> ProblemResponse {
    ProblemResponse::from_repository(T::COLLECTION.as_str(), err)
}

fn missing<T: Record>(id: &str) -> ProblemResponse {
    ProblemResponse::not_found(format!("{} '{id}' not found", T::COLLECTION.kind()))
}

fn record_written<T: Record>(op: &'static str, id: &str) {
    counter!(
        "crm_records_written_total",
        "collection" => T::COLLECTION.as_str(),
        "op" => op
    )
    .increment(1);
    info!(stage = "records", collection = %T::COLLECTION, op, id, "record written");
}

pub async fn list(
    State(state): State<AppState>,
    _session: Authenticated,
    Path(name): Path<String>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, ProblemResponse> {
    let collection = collection_named(&name)?;
    let query = query_params(query)?;
    let filter = query.filter()?;
    with_repository!(state, collection, |repo| {
        list_in(repo, &filter, &query).await
    })
}

async fn list_in<T: Record>(
    repo: CollectionRepository<T>,
    filter: &ListFilter,
    query: &ListQuery,
) -> Result<Response, ProblemResponse> {
    let records = repo.list().await.map_err(store_problem::<T>)?;
    let page = list_page(records, filter, query.page, query.page_size);
    Ok(Json(page).into_response())
}

pub async fn get_one(
    State(state): State<AppState>,
    _session: Authenticated,
    Path((name, id)): Path<(String, String)>,
) -> Result<Response, ProblemResponse> {
    let collection = collection_named(&name)?;
    with_repository!(state, collection, |repo| get_in(repo, &id).await)
}

async fn get_in<T: Record>(
    repo: CollectionRepository<T>,
    id: &str,
) -> Result<Response, ProblemResponse> {
    match repo.get(id).await.map_err(store_problem::<T>)? {
        Some(stored) => Ok(Json(stored).into_response()),
        None => Err(missing::<T>(id)),
    }
}

pub async fn create(
    State(state): State<AppState>,
    _session: Authenticated,
    Path(kind): Path<String>,
    body: Bytes,
) -> Result<Response, ProblemResponse> {
    let collection = collection_of_kind(&kind)?;
    let now = state.now();
    with_repository!(state, collection, |repo| create_in(repo, &body, now).await)
}

async fn create_in<T: Record>(
    repo: CollectionRepository<T>,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<Response, ProblemResponse> {
    let record: T = parse_body(body)?;
    let stored = repo.insert(record, now).await.map_err(store_problem::<T>)?;
    record_written::<T>("create", stored.record.id());
    Ok((StatusCode::CREATED, Json(stored)).into_response())
}

pub async fn update(
    State(state): State<AppState>,
    _session: Authenticated,
    Path((name, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ProblemResponse> {
    let collection = collection_named(&name)?;
    let patch: Map<String, Value> = parse_body(&body)?;
    let now = state.now();
    with_repository!(state, collection, |repo| {
        update_in(repo, &id, patch, now).await
    })
}

async fn update_in<T: Record>(
    repo: CollectionRepository<T>,
    id: &str,
    patch: Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<Response, ProblemResponse> {
    let stored = repo
        .merge_update(id, patch, now)
        .await
        .map_err(store_problem::<T>)?;
    record_written::<T>("update", id);
    Ok(Json(stored).into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    session: Authenticated,
    Path((name, id)): Path<(String, String)>,
) -> Result<Response, ProblemResponse> {
    let collection = collection_named(&name)?;
    if !session.can_delete() {
        return Err(ProblemResponse::forbidden(
            "insufficient_role",
            "deleting records requires the Admin or Manager role",
        ));
    }
    with_repository!(state, collection, |repo| delete_in(repo, &id).await)
}

async fn delete_in<T: Record>(
    repo: CollectionRepository<T>,
    id: &str,
) -> Result<Response, ProblemResponse> {
    if !repo.delete(id).await.map_err(store_problem::<T>)? {
        return Err(missing::<T>(id));
    }
    record_written::<T>("delete", id);
    Ok(Json(json!({ "success": true, "id": id })).into_response())
}
