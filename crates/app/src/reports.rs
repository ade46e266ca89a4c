//! Read-only views derived from a snapshot of every collection.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crm_core::analytics::{
    breakdown as compute_breakdown, forecast as compute_forecast, sales_trends, validate_months,
    AnalyticsError, Breakdown, DashboardMetrics, Forecast, ForecastPeriod, MonthTrend, Period,
};
use crm_core::notifications::NotificationFeed;
use crm_core::types::CrmSnapshot;
use crm_core::validation::ValidationError;

use crate::problem::{query_params, ProblemResponse};
use crate::router::AppState;
use crate::session::Authenticated;

async fn snapshot(state: &AppState) -> Result<CrmSnapshot, ProblemResponse> {
    state
        .storage()
        .snapshot()
        .await
        .map_err(|err| ProblemResponse::from_repository("snapshot", err))
}

fn invalid_param(field: &'static str, err: AnalyticsError) -> ProblemResponse {
    ProblemResponse::validation(ValidationError::field(field, err.to_string()))
}

/// `GET /api/notifications/`
pub async fn notifications(
    State(state): State<AppState>,
    _session: Authenticated,
) -> Result<Json<NotificationFeed>, ProblemResponse> {
    let snapshot = snapshot(&state).await?;
    Ok(Json(NotificationFeed::derive(&snapshot, state.now())))
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    #[serde(default)]
    period: Option<String>,
}

/// `GET /api/dashboard-metrics/` and `GET /analytics/api/metrics/`
pub async fn dashboard_metrics(
    State(state): State<AppState>,
    _session: Authenticated,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> Result<Json<DashboardMetrics>, ProblemResponse> {
    let period = match query_params(query)?.period.as_deref() {
        None | Some("") => Period::default(),
        Some(raw) => raw
            .parse::<Period>()
            .map_err(|err| invalid_param("period", err))?,
    };
    let snapshot = snapshot(&state).await?;
    Ok(Json(DashboardMetrics::compute(
        &snapshot,
        period,
        state.now(),
    )))
}

#[derive(Debug, Default, Deserialize)]
pub struct TrendsQuery {
    #[serde(default)]
    months: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TrendsResponse {
    months: u32,
    trends: Vec<MonthTrend>,
}

/// `GET /analytics/api/trends/?months=N`
pub async fn trends(
    State(state): State<AppState>,
    _session: Authenticated,
    query: Result<Query<TrendsQuery>, QueryRejection>,
) -> Result<Json<TrendsResponse>, ProblemResponse> {
    let months = validate_months(query_params(query)?.months)
        .map_err(|err| invalid_param("months", err))?;
    let snapshot = snapshot(&state).await?;
    Ok(Json(TrendsResponse {
        months,
        trends: sales_trends(&snapshot, months, state.now()),
    }))
}

/// `GET /analytics/api/forecast/?period=month|quarter`
pub async fn forecast(
    State(state): State<AppState>,
    _session: Authenticated,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> Result<Json<Forecast>, ProblemResponse> {
    let period = match query_params(query)?.period.as_deref() {
        None | Some("") => ForecastPeriod::default(),
        Some(raw) => raw
            .parse::<ForecastPeriod>()
            .map_err(|err| invalid_param("period", err))?,
    };
    let snapshot = snapshot(&state).await?;
    Ok(Json(compute_forecast(
        &snapshot,
        period,
        state.now().date_naive(),
    )))
}

/// `GET /analytics/api/breakdown/`
pub async fn breakdown(
    State(state): State<AppState>,
    _session: Authenticated,
) -> Result<Json<Breakdown>, ProblemResponse> {
    let snapshot = snapshot(&state).await?;
    Ok(Json(compute_breakdown(&snapshot)))
}
