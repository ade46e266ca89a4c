use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use crm_storage::Database;
use crm_util::DemoUser;

use crate::session::{self, SessionKeys};
use crate::{customers, records, reports, sales, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    sessions: SessionKeys,
    demo_user: Arc<DemoUser>,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        sessions: SessionKeys,
        demo_user: DemoUser,
    ) -> Self {
        Self {
            metrics,
            storage,
            sessions,
            demo_user: Arc::new(demo_user),
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn sessions(&self) -> &SessionKeys {
        &self.sessions
    }

    pub fn demo_user(&self) -> &DemoUser {
        &self.demo_user
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/login/", post(session::login))
        .route("/logout/", post(session::logout))
        .route("/api/notifications/", get(reports::notifications))
        .route("/api/dashboard-metrics/", get(reports::dashboard_metrics))
        .route("/api/:collection/", get(records::list))
        .route("/api/:collection/add/", post(records::create))
        .route("/api/:collection/:id/", get(records::get_one))
        .route("/api/:collection/:id/update/", post(records::update))
        .route("/api/:collection/:id/delete/", post(records::delete))
        .route("/sales/api/deal/:id/move/", post(sales::move_deal))
        .route(
            "/sales/api/deal/:id/recommendations/",
            get(sales::deal_recommendations),
        )
        .route("/sales/api/pipeline/", get(sales::pipeline))
        .route("/customers/api/search", get(customers::search))
        .route("/analytics/api/metrics/", get(reports::dashboard_metrics))
        .route("/analytics/api/trends/", get(reports::trends))
        .route("/analytics/api/forecast/", get(reports::forecast))
        .route("/analytics/api/breakdown/", get(reports::breakdown))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
