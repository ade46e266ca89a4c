//! Signed session cookies and the CSRF token bound to them.
//!
//! A session is an HS256 JWT carried in the `crm_session` cookie (or a bearer
//! header). Its CSRF token is derived from the `jti` claim, so nothing about a
//! session is kept server side.

use std::time::Duration;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::problem::{parse_body, ProblemResponse};
use crate::router::AppState;

pub const SESSION_COOKIE: &str = "crm_session";
pub const CSRF_HEADER: &str = "x-csrftoken";

/// Roles allowed to delete records.
const DELETE_ROLES: [&str; 2] = ["Admin", "Manager"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub name: String,
    pub role: String,
    pub jti: String,
    pub exp: usize,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session secret: {0}")]
    Key(hmac::digest::InvalidLength),
    #[error("failed to sign session: {0}")]
    Sign(jsonwebtoken::errors::Error),
    #[error("invalid session: {0}")]
    Invalid(String),
    #[error("session expired")]
    Expired,
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    csrf_key: Hmac<Sha256>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, SessionError> {
        let csrf_key = Hmac::<Sha256>::new_from_slice(secret).map_err(SessionError::Key)?;
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        Ok(Self {
            csrf_key,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(
        &self,
        subject: &str,
        name: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, SessionClaims), SessionError> {
        let expires_at = now.timestamp().max(0) as u64 + self.ttl.as_secs();
        let claims = SessionClaims {
            sub: subject.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: expires_at as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(SessionError::Sign)?;
        Ok((token, claims))
    }

    /// Decodes a token and checks its expiry against `now`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, SessionError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| SessionError::Invalid(format!("{err}")))?;
        if now.timestamp() >= data.claims.exp as i64 {
            return Err(SessionError::Expired);
        }
        Ok(data.claims)
    }

    pub fn csrf_token(&self, jti: &str) -> String {
        hex::encode(self.csrf_mac(jti).finalize().into_bytes())
    }

    fn csrf_matches(&self, jti: &str, provided: &str) -> bool {
        let Ok(provided) = hex::decode(provided) else {
            return false;
        };
        let expected = self.csrf_mac(jti).finalize().into_bytes();
        let expected: &[u8] = expected.as_ref();
        expected.ct_eq(provided.as_slice()).into()
    }

    fn csrf_mac(&self, jti: &str) -> Hmac<Sha256> {
        let mut mac = self.csrf_key.clone();
        mac.update(jti.as_bytes());
        mac
    }
}

/// Extractor for routes that require a session.
///
/// POST requests must also present the session's CSRF token.
#[derive(Debug, Clone)]
pub struct Authenticated(pub SessionClaims);

impl Authenticated {
    pub fn can_delete(&self) -> bool {
        DELETE_ROLES.contains(&self.0.role.as_str())
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ProblemResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token =
            session_token(&parts.headers).ok_or_else(ProblemResponse::unauthenticated)?;
        let claims = state
            .sessions()
            .verify(&token, state.now())
            .map_err(|err| {
                warn!(stage = "session", error = %err, path = %parts.uri.path(), "rejected session");
                ProblemResponse::unauthenticated()
            })?;

        if parts.method == Method::POST {
            let provided = parts
                .headers
                .get(CSRF_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            if !state.sessions().csrf_matches(&claims.jti, provided) {
                warn!(stage = "session", sub = %claims.sub, path = %parts.uri.path(), "csrf token mismatch");
                return Err(ProblemResponse::forbidden(
                    "csrf_failed",
                    "missing or invalid CSRF token",
                ));
            }
        }

        Ok(Self(claims))
    }
}

/// Reads the session token from the cookie, falling back to a bearer header.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string());
    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| raw.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    })
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    user: String,
    role: &'static str,
    csrf_token: String,
}

/// The configured operator account signs in as an administrator.
const DEMO_ROLE: &str = "Admin";

pub async fn login(State(state): State<AppState>, body: Bytes) -> Response {
    let request: LoginRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(problem) => return problem.into_response(),
    };

    let user = state.demo_user();
    let email_ok = request.email.trim().eq_ignore_ascii_case(&user.email);
    let password_ok: bool = request
        .password
        .as_bytes()
        .ct_eq(user.password.as_bytes())
        .into();
    if !(email_ok && password_ok) {
        warn!(stage = "session", email = %request.email, "login rejected");
        return ProblemResponse::new(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "email or password is incorrect",
        )
        .into_response();
    }

    let sessions = state.sessions();
    let (token, claims) = match sessions.issue(&user.email, &user.name, DEMO_ROLE, state.now()) {
        Ok(issued) => issued,
        Err(err) => {
            tracing::error!(stage = "session", error = %err, "failed to issue session");
            return ProblemResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "session_unavailable",
                "could not open a session",
            )
            .into_response();
        }
    };

    info!(stage = "session", sub = %claims.sub, "session opened");
    let cookie = format!(
        "{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        sessions.ttl().as_secs()
    );
    let body = LoginResponse {
        user: claims.name.clone(),
        role: DEMO_ROLE,
        csrf_token: sessions.csrf_token(&claims.jti),
    };
    with_cookie(Json(body).into_response(), &cookie)
}

pub async fn logout() -> Response {
    let cookie = format!("{SESSION_COOKIE}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0");
    with_cookie(StatusCode::NO_CONTENT.into_response(), &cookie)
}

fn with_cookie(mut response: Response, cookie: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn keys() -> SessionKeys {
        SessionKeys::new(b"test-session-secret", Duration::from_secs(3600)).expect("keys")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("timestamp")
    }

    #[test]
    fn issued_token_verifies_until_expiry() {
        let keys = keys();
        let (token, claims) = keys
            .issue("admin@crm.com", "Admin User", "Admin", at(1_700_000_000))
            .expect("issue");
        assert_eq!(claims.exp, 1_700_003_600);

        let verified = keys.verify(&token, at(1_700_003_599)).expect("verify");
        assert_eq!(verified, claims);
        assert!(matches!(
            keys.verify(&token, at(1_700_003_600)),
            Err(SessionError::Expired)
        ));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = SessionKeys::new(b"other", Duration::from_secs(60)).expect("keys");
        let (token, _) = other
            .issue("a@b.co", "A", "Admin", at(1_700_000_000))
            .expect("issue");
        assert!(matches!(
            keys().verify(&token, at(1_700_000_001)),
            Err(SessionError::Invalid(_))
        ));
    }

    #[test]
    fn csrf_token_is_bound_to_jti() {
        let keys = keys();
        let token = keys.csrf_token("jti-1");
        assert_eq!(token.len(), 64);
        assert!(keys.csrf_matches("jti-1", &token));
        assert!(!keys.csrf_matches("jti-2", &token));
        assert!(!keys.csrf_matches("jti-1", "not-hex"));
        assert!(!keys.csrf_matches("jti-1", ""));
    }

    #[test]
    fn session_token_prefers_cookie_then_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; crm_session=abc.def; other=1"),
        );
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc.def"));

        headers.remove(header::COOKIE);
        assert_eq!(session_token(&headers).as_deref(), Some("xyz"));

        headers.remove(header::AUTHORIZATION);
        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn delete_requires_admin_or_manager() {
        let claims = |role: &str| SessionClaims {
            sub: "s".to_string(),
            name: "n".to_string(),
            role: role.to_string(),
            jti: "j".to_string(),
            exp: 0,
        };
        assert!(Authenticated(claims("Admin")).can_delete());
        assert!(Authenticated(claims("Manager")).can_delete());
        assert!(!Authenticated(claims("Sales")).can_delete());
    }
}
