use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crm_core::pipeline::{PipelineSummary, Stage, StageMove};
use crm_core::recommendations::{recommendations, Recommendation};
use crm_core::validation::ValidationError;
use crm_storage::Database;

use crate::problem::{parse_body, query_params, ProblemResponse};
use crate::router::AppState;
use crate::session::Authenticated;

#[derive(Debug, Deserialize)]
struct MoveRequest {
    #[serde(default)]
    stage: Option<String>,
}

/// `POST /sales/api/deal/:id/move/`
///
/// The target stage is checked before the deal is read; a valid move performs
/// a single write that touches only the deal's `stage`.
pub async fn move_deal(
    State(state): State<AppState>,
    _session: Authenticated,
    Path(deal_id): Path<String>,
    body: Bytes,
) -> Result<Json<StageMove>, ProblemResponse> {
    let request: MoveRequest = parse_body(&body)?;
    let stage = parse_stage(request.stage.as_deref())?;

    let deals = state.storage().deals();
    let deal = deals
        .get(&deal_id)
        .await
        .map_err(|err| ProblemResponse::from_repository("deals", err))?
        .ok_or_else(|| ProblemResponse::not_found(format!("deal '{deal_id}' not found")))?;
    let previous_stage = deal.record.stage;

    let written = deals
        .set_field(&deal_id, "stage", &Value::from(stage.as_str()), state.now())
        .await
        .map_err(|err| ProblemResponse::from_repository("deals", err))?;
    if !written {
        return Err(ProblemResponse::not_found(format!(
            "deal '{deal_id}' not found"
        )));
    }

    counter!("crm_stage_moves_total", "stage" => stage.as_str()).increment(1);
    info!(stage = "sales", deal_id = %deal_id, from = %previous_stage, to = %stage, "deal moved");

    let pipeline = load_pipeline(state.storage(), false).await?;
    Ok(Json(StageMove {
        deal_id,
        previous_stage,
        stage,
        pipeline,
    }))
}

fn parse_stage(raw: Option<&str>) -> Result<Stage, ProblemResponse> {
    let raw = raw.ok_or_else(|| {
        ProblemResponse::validation(ValidationError::field("stage", "is required"))
    })?;
    raw.parse::<Stage>().map_err(|err| {
        ProblemResponse::validation(ValidationError::field(
            "stage",
            format!("{err}; expected one of {}", stage_names()),
        ))
    })
}

fn stage_names() -> String {
    Stage::ALL
        .iter()
        .map(|stage| stage.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Default, Deserialize)]
pub struct PipelineQuery {
    #[serde(default)]
    include_deals: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct PipelineResponse {
    pipeline: PipelineSummary,
}

/// `GET /sales/api/pipeline/`
pub async fn pipeline(
    State(state): State<AppState>,
    _session: Authenticated,
    query: Result<Query<PipelineQuery>, QueryRejection>,
) -> Result<Json<PipelineResponse>, ProblemResponse> {
    let query = query_params(query)?;
    let pipeline = load_pipeline(state.storage(), query.include_deals.unwrap_or(false)).await?;
    Ok(Json(PipelineResponse { pipeline }))
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    deal_id: String,
    recommendations: Vec<Recommendation>,
}

/// `GET /sales/api/deal/:id/recommendations/`
pub async fn deal_recommendations(
    State(state): State<AppState>,
    _session: Authenticated,
    Path(deal_id): Path<String>,
) -> Result<Json<RecommendationsResponse>, ProblemResponse> {
    let deal = state
        .storage()
        .deals()
        .get(&deal_id)
        .await
        .map_err(|err| ProblemResponse::from_repository("deals", err))?
        .ok_or_else(|| ProblemResponse::not_found(format!("deal '{deal_id}' not found")))?;
    let recommendations = recommendations(&deal, state.now().date_naive());
    Ok(Json(RecommendationsResponse {
        deal_id,
        recommendations,
    }))
}

async fn load_pipeline(
    storage: &Database,
    include_deals: bool,
) -> Result<PipelineSummary, ProblemResponse> {
    let deals = storage
        .deals()
        .list()
        .await
        .map_err(|err| ProblemResponse::from_repository("deals", err))?;
    let records = deals.iter().map(|stored| &stored.record);
    Ok(if include_deals {
        PipelineSummary::with_deals(records)
    } else {
        PipelineSummary::from_deals(records)
    })
}
