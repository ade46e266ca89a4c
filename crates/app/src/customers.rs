use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crm_core::search::{clamp_limit, search_customers, searchable, CustomerHit};

use crate::problem::{query_params, ProblemResponse};
use crate::router::AppState;
use crate::session::Authenticated;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    results: Vec<CustomerHit>,
}

/// `GET /customers/api/search?q=&limit=`
///
/// Queries shorter than two characters answer with no results without touching the store.
pub async fn search(
    State(state): State<AppState>,
    _session: Authenticated,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<SearchResponse>, ProblemResponse> {
    let query = query_params(query)?;
    let Some(needle) = query.q.as_deref().and_then(searchable) else {
        return Ok(Json(SearchResponse {
            results: Vec::new(),
        }));
    };

    counter!("crm_search_requests_total").increment(1);
    let customers = state
        .storage()
        .customers()
        .list()
        .await
        .map_err(|err| ProblemResponse::from_repository("customers", err))?;
    let results = search_customers(
        customers.iter().map(|stored| &stored.record),
        needle,
        clamp_limit(query.limit),
    );
    debug!(stage = "search", query = needle, hits = results.len(), "customer search served");
    Ok(Json(SearchResponse { results }))
}
