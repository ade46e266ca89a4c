use axum::{
    extract::{rejection::QueryRejection, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::error;

use crm_core::validation::{decode_document, FieldError, ValidationError};
use crm_storage::RepositoryError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

/// `application/problem+json` error response.
#[derive(Debug)]
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
                errors: None,
            },
        }
    }

    pub fn validation(err: ValidationError) -> Self {
        let mut problem = Self::new(StatusCode::BAD_REQUEST, "validation_failed", err.to_string());
        problem.body.errors = Some(err.errors);
        problem
    }

    pub fn invalid_json<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_json", detail)
    }

    pub fn not_found<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", detail)
    }

    pub fn unauthenticated() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "a valid session is required",
        )
    }

    pub fn forbidden<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::FORBIDDEN, problem_type, detail)
    }

    /// Maps a repository failure. Store-side failures are logged and counted under `scope`
    /// and reach the caller only as a generic 500.
    pub fn from_repository(scope: &'static str, err: RepositoryError) -> Self {
        match err {
            RepositoryError::Validation(err) => Self::validation(err),
            RepositoryError::NotFound { .. } => Self::not_found(err.to_string()),
            RepositoryError::Duplicate { field: "email", .. } => {
                Self::new(StatusCode::CONFLICT, "duplicate_email", err.to_string())
            }
            RepositoryError::Duplicate { .. } => {
                Self::new(StatusCode::CONFLICT, "duplicate_value", err.to_string())
            }
            RepositoryError::IdTaken { .. } => {
                Self::new(StatusCode::CONFLICT, "duplicate_id", err.to_string())
            }
            RepositoryError::Decode { .. }
            | RepositoryError::Encode { .. }
            | RepositoryError::Database(_) => {
                error!(stage = "storage", scope, error = %err, "record store request failed");
                counter!("crm_store_errors_total", "collection" => scope).increment(1);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "store_unavailable",
                    "the record store is currently unavailable",
                )
            }
        }
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

/// Decodes a JSON request body. Syntax errors are `invalid_json`; well-formed
/// bodies that do not fit the expected shape are `validation_failed` with the
/// offending field listed.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProblemResponse> {
    let document: Value = serde_json::from_slice(body)
        .map_err(|err| ProblemResponse::invalid_json(err.to_string()))?;
    decode_document(document).map_err(ProblemResponse::validation)
}

pub fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ProblemResponse> {
    query
        .map(|Query(params)| params)
        .map_err(|err| ProblemResponse::new(StatusCode::BAD_REQUEST, "invalid_query", err.body_text()))
}
