use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use url::Url;

use crm_core::listing::Page;
use crm_core::notifications::NotificationFeed;
use crm_core::pipeline::{PipelineSummary, Stage, StageMove};
use crm_core::search::CustomerHit;
use crm_core::types::{Collection, Record};

/// Cookie carrying the signed session token.
pub const SESSION_COOKIE: &str = "crm_session";
/// Header that must echo the session's CSRF token on mutating calls.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Authenticated session returned by `POST /login/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub csrf_token: String,
    pub user: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user: String,
    role: String,
    csrf_token: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<CustomerHit>,
}

#[derive(Debug, Deserialize)]
struct PipelineResponse {
    pipeline: PipelineSummary,
}

/// Typed client for the CRM JSON endpoints.
#[derive(Clone)]
pub struct CrmClient {
    http: Client,
    base_url: Url,
    session: Option<Session>,
}

impl CrmClient {
    pub fn new(base_url: Url, http: Client) -> Self {
        Self {
            http,
            base_url,
            session: None,
        }
    }

    /// Attaches a session to every subsequent request.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Opens a session with the given credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let url = self.base_url.join("login/")?;
        let response = self
            .http
            .post(url)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let token = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(session_cookie_value)
            .ok_or(ClientError::MissingSessionCookie)?;
        let body: LoginResponse = response.json().await?;

        Ok(Session {
            token,
            csrf_token: body.csrf_token,
            user: body.user,
            role: body.role,
        })
    }

    /// `GET /customers/api/search`; the server answers short queries with no hits.
    pub async fn search_customers(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<CustomerHit>, ClientError> {
        let mut url = self.base_url.join("customers/api/search")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            if let Some(limit) = limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        let response = self.request(Method::GET, url).send().await?;
        parse_json::<SearchResponse>(response)
            .await
            .map(|body| body.results)
    }

    pub async fn pipeline(&self) -> Result<PipelineSummary, ClientError> {
        let url = self.base_url.join("sales/api/pipeline/")?;
        let response = self.request(Method::GET, url).send().await?;
        parse_json::<PipelineResponse>(response)
            .await
            .map(|body| body.pipeline)
    }

    pub async fn move_deal(&self, deal_id: &str, stage: Stage) -> Result<StageMove, ClientError> {
        let url = self.endpoint(&["sales", "api", "deal", deal_id, "move"])?;
        let response = self
            .request(Method::POST, url)
            .json(&json!({ "stage": stage }))
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn notifications(&self) -> Result<NotificationFeed, ClientError> {
        let url = self.base_url.join("api/notifications/")?;
        let response = self.request(Method::GET, url).send().await?;
        parse_json(response).await
    }

    /// Lists one page of a collection.
    pub async fn list<T: Record>(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<Page<T>, ClientError> {
        let mut url = self
            .base_url
            .join(&format!("api/{}/", T::COLLECTION.as_str()))?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("page_size", &page_size.to_string());
        let response = self.request(Method::GET, url).send().await?;
        parse_json(response).await
    }

    pub async fn create<T: Record>(&self, record: &T) -> Result<T, ClientError> {
        let url = self
            .base_url
            .join(&format!("api/{}/add/", T::COLLECTION.kind()))?;
        let response = self.request(Method::POST, url).json(record).send().await?;
        parse_json(response).await
    }

    pub async fn update<T: Record>(
        &self,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<T, ClientError> {
        let url = self.record_url(T::COLLECTION, id, "update")?;
        let response = self.request(Method::POST, url).json(patch).send().await?;
        parse_json(response).await
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> Result<(), ClientError> {
        let url = self.record_url(collection, id, "delete")?;
        let response = self.request(Method::POST, url).send().await?;
        ensure_success(response).await.map(|_| ())
    }

    fn record_url(
        &self,
        collection: Collection,
        id: &str,
        action: &str,
    ) -> Result<Url, ClientError> {
        self.endpoint(&["api", collection.as_str(), id, action])
    }

    /// Appends percent-encoded path segments and a trailing slash to the base url.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::CannotBeABase)?
            .pop_if_empty()
            .extend(segments)
            .push("");
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let is_post = method == Method::POST;
        let mut builder = self.http.request(method, url);
        if let Some(session) = &self.session {
            let cookie = format!("{SESSION_COOKIE}={}", session.token);
            builder = builder.header(header::COOKIE, cookie);
            if is_post {
                builder = builder.header(CSRF_HEADER, &session.csrf_token);
            }
        }
        builder
    }
}

fn session_cookie_value(set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
}

/// Problem body returned by the server on failures.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProblemBody {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub detail: String,
}

/// Errors produced by the CRM client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("login response did not set the session cookie")]
    MissingSessionCookie,
    #[error("base url cannot carry a path")]
    CannotBeABase,
}

impl ClientError {
    /// Decodes the problem+json body of a status error, when there is one.
    pub fn problem(&self) -> Option<ProblemBody> {
        match self {
            Self::Status { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(ClientError::Status { status, body });
    }
    Ok(response)
}

async fn parse_json<T>(response: Response) -> Result<T, ClientError>
where
    T: DeserializeOwned,
{
    let response = ensure_success(response).await?;
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::types::Task;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> CrmClient {
        let base = Url::parse(&server.url("/")).expect("url");
        CrmClient::new(base, Client::builder().build().expect("client"))
    }

    fn session() -> Session {
        Session {
            token: "jwt-token".to_string(),
            csrf_token: "csrf-123".to_string(),
            user: "Admin User".to_string(),
            role: "Admin".to_string(),
        }
    }

    fn empty_pipeline() -> Value {
        json!({
            "stages": Stage::ALL.iter().map(|stage| json!({
                "stage": stage.as_str(),
                "count": 0,
                "total_value": 0.0,
                "weighted_value": 0.0,
            })).collect::<Vec<_>>(),
            "total_count": 0,
            "total_value": 0.0,
        })
    }

    #[test]
    fn session_cookie_is_extracted_from_set_cookie() {
        assert_eq!(
            session_cookie_value("crm_session=abc.def; HttpOnly; Path=/"),
            Some("abc.def".to_string())
        );
        assert_eq!(session_cookie_value("other=1; Path=/"), None);
        assert_eq!(session_cookie_value("crm_session=; Max-Age=0"), None);
    }

    #[test]
    fn record_ids_are_encoded_as_one_segment() {
        let base = Url::parse("http://localhost:8000/crm/").expect("url");
        let client = CrmClient::new(base, Client::new());
        let url = client
            .record_url(Collection::Tasks, "a/b?c#d", "delete")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/crm/api/tasks/a%2Fb%3Fc%23d/delete/"
        );
        let url = client
            .endpoint(&["sales", "api", "deal", "deal 123", "move"])
            .expect("url");
        assert_eq!(url.path(), "/crm/sales/api/deal/deal%20123/move/");

        let opaque = CrmClient::new(Url::parse("mailto:crm@example.com").expect("url"), Client::new());
        assert!(matches!(
            opaque.record_url(Collection::Deals, "d-1", "update"),
            Err(ClientError::CannotBeABase)
        ));
    }

    #[tokio::test]
    async fn login_reads_cookie_and_csrf_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/login/")
                    .json_body(json!({ "email": "admin@crm.com", "password": "admin123" }));
                then.status(200)
                    .header("Set-Cookie", "crm_session=signed.jwt; HttpOnly; Path=/")
                    .json_body(json!({
                        "user": "Admin User",
                        "role": "Admin",
                        "csrf_token": "csrf-abc",
                    }));
            })
            .await;

        let session = client(&server)
            .login("admin@crm.com", "admin123")
            .await
            .expect("login");
        mock.assert_async().await;
        assert_eq!(session.token, "signed.jwt");
        assert_eq!(session.csrf_token, "csrf-abc");
        assert_eq!(session.role, "Admin");
    }

    #[tokio::test]
    async fn search_sends_query_and_session_cookie() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/customers/api/search")
                    .query_param("q", "jo")
                    .header("Cookie", "crm_session=jwt-token");
                then.status(200).json_body(json!({
                    "results": [{
                        "id": "c-1",
                        "name": "John Smith",
                        "email": "john.smith@techcorp.com",
                        "company": "TechCorp",
                        "status": "Active",
                    }]
                }));
            })
            .await;

        let hits = client(&server)
            .with_session(session())
            .search_customers("jo", None)
            .await
            .expect("search");
        mock.assert_async().await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "John Smith");
    }

    #[tokio::test]
    async fn move_deal_posts_stage_with_csrf_header() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/sales/api/deal/deal123/move/")
                    .header("X-CSRFToken", "csrf-123")
                    .json_body(json!({ "stage": "Negotiation" }));
                then.status(200).json_body(json!({
                    "deal_id": "deal123",
                    "previous_stage": "Proposal",
                    "stage": "Negotiation",
                    "pipeline": empty_pipeline(),
                }));
            })
            .await;

        let outcome = client(&server)
            .with_session(session())
            .move_deal("deal123", Stage::Negotiation)
            .await
            .expect("move");
        mock.assert_async().await;
        assert_eq!(outcome.previous_stage, Stage::Proposal);
        assert_eq!(outcome.stage, Stage::Negotiation);
        assert_eq!(outcome.pipeline.stages.len(), 6);
    }

    #[tokio::test]
    async fn create_posts_to_kind_route() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/task/add/");
                then.status(201).json_body(json!({
                    "id": "t-9",
                    "title": "Prepare demo",
                    "priority": "High",
                    "status": "Pending",
                    "description": "",
                    "updated_at": "2025-01-01T00:00:00Z",
                }));
            })
            .await;

        let task: Task = serde_json::from_value(json!({
            "title": "Prepare demo",
            "priority": "High",
        }))
        .expect("task");
        let created = client(&server)
            .with_session(session())
            .create(&task)
            .await
            .expect("create");
        mock.assert_async().await;
        assert_eq!(created.id, "t-9");
    }

    #[tokio::test]
    async fn error_status_exposes_problem_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/sales/api/deal/deal123/move/");
                then.status(400)
                    .header("Content-Type", "application/problem+json")
                    .json_body(json!({
                        "type": "validation_failed",
                        "title": "Bad Request",
                        "detail": "stage: unknown stage 'Won'",
                    }));
            })
            .await;

        let err = client(&server)
            .with_session(session())
            .move_deal("deal123", Stage::ClosedWon)
            .await
            .expect_err("should fail");
        match &err {
            ClientError::Status { status, .. } => assert_eq!(*status, StatusCode::BAD_REQUEST),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.problem().expect("problem").kind, "validation_failed");
    }
}
