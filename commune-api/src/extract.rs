//! Session extraction
//!
//! Handlers that need a signed-in member take [`AuthMember`]; public handlers
//! that adapt their output to the viewer take [`OptionalAuthMember`].
//!
//! The credential is read from `Authorization: Bearer <token>` first, then
//! from the `commune_session` cookie.
//!
//! [`ApiJson`], [`ApiPath`] and [`ApiQuery`] wrap the axum extractors so that
//! malformed input is reported in the usual error envelope.

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use commune_common::auth::decode_session;
use commune_common::db::Member;
use commune_common::Access;
use tracing::debug;
use uuid::Uuid;

use crate::db::{members, roles, sessions};
use crate::error::ApiError;
use crate::AppState;

/// JSON request body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Path parameters
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Query string
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "commune_session";

/// Signed-in member with their effective permissions
#[derive(Debug, Clone)]
pub struct AuthMember {
    pub member: Member,
    pub session_id: Uuid,
    pub access: Access,
}

impl AuthMember {
    pub fn id(&self) -> Uuid {
        self.member.id
    }
}

/// Signed-in member, or `None` for anonymous (or invalid) credentials
#[derive(Debug, Clone)]
pub struct OptionalAuthMember(pub Option<AuthMember>);

/// Raw session token from the request, if any
pub fn session_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        let value = value.trim();
        if value.len() > 7 && value[..7].eq_ignore_ascii_case("bearer ") {
            let token = value[7..].trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Resolve a token to a member; every failure is `401`
pub async fn authenticate(state: &AppState, token: &str) -> Result<AuthMember, ApiError> {
    let now = commune_common::time::now();

    let claims = decode_session(token, &state.session_secret, now).map_err(|e| {
        debug!("Rejected session token: {}", e);
        ApiError::Unauthorized("Invalid or expired session".to_string())
    })?;

    let session = sessions::find(&state.db, claims.sid)
        .await?
        .filter(|s| s.member_id == claims.sub && s.is_active(now))
        .ok_or_else(|| ApiError::Unauthorized("Session has been revoked or expired".to_string()))?;

    let member = members::find_by_id(&state.db, session.member_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Member no longer exists".to_string()))?;

    let assignments = roles::effective_for_member(&state.db, member.id).await?;
    let access = Access::from_assignments(member.id, &assignments);

    Ok(AuthMember {
        member,
        session_id: session.id,
        access,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthMember {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_credential(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Sign-in required".to_string()))?;
        authenticate(state, &token).await
    }
}

#[async_trait]
impl FromRequestParts<AppState> for OptionalAuthMember {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = session_credential(&parts.headers) else {
            return Ok(OptionalAuthMember(None));
        };

        match authenticate(state, &token).await {
            Ok(member) => Ok(OptionalAuthMember(Some(member))),
            Err(ApiError::Unauthorized(_)) => Ok(OptionalAuthMember(None)),
            Err(e) => Err(e),
        }
    }
}

/// `Set-Cookie` value carrying a new session
pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_header_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));
        headers.insert(COOKIE, HeaderValue::from_static("commune_session=cookie-token"));

        assert_eq!(session_credential(&headers).as_deref(), Some("header-token"));
    }

    #[test]
    fn test_cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; commune_session=cookie-token; lang=en"),
        );

        assert_eq!(session_credential(&headers).as_deref(), Some("cookie-token"));
    }

    #[test]
    fn test_non_bearer_authorization_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(session_credential(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer lower-case"));
        assert_eq!(session_credential(&headers).as_deref(), Some("lower-case"));
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = session_cookie("abc", 3600, true);
        assert!(cookie.starts_with("commune_session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.ends_with("; Secure"));

        let cleared = clear_session_cookie(false);
        assert!(cleared.contains("Max-Age=0"));
        assert!(!cleared.contains("Secure"));
    }
}
