//! Passwordless authentication endpoints
//!
//! 1. `POST /api/auth/magic-link` issues a single-use token and sends the link
//! 2. `POST|GET /api/auth/verify` exchanges the token for a session
//! 3. `POST /api/auth/logout` revokes the session

use axum::{
    extract::State,
    http::{
        header::{SET_COOKIE, USER_AGENT},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use commune_common::auth::{
    check_magic_link, encode_session, hash_token, magic_link_expiry, magic_link_url,
    normalize_email, MagicLinkToken, SessionClaims,
};
use commune_common::db::Member;
use commune_common::time::{hours_after, now};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::optional_text;
use crate::db::{magic_links, members, roles, sessions};
use crate::error::{ApiError, ApiResult};
use crate::extract::{clear_session_cookie, session_cookie, ApiJson, ApiQuery, AuthMember};
use crate::notify::Notification;
use crate::AppState;

const MAX_USER_AGENT_LEN: usize = 512;

#[derive(Debug, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub member: Member,
}

/// POST /api/auth/magic-link
///
/// Unknown addresses get a new (unverified) member. The response is the same
/// whether or not the member existed.
pub async fn request_magic_link(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<MagicLinkRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let email = normalize_email(&req.email)?;
    let name = optional_text(req.name);
    let issued_at = now();

    let (member, created) =
        members::find_or_create_by_email(&state.db, &email, name.as_deref(), issued_at).await?;

    let token = MagicLinkToken::generate();
    let expires_at = magic_link_expiry(issued_at, state.config.magic_link_ttl_minutes);
    magic_links::insert(&state.db, member.id, &token.token_hash, expires_at, issued_at).await?;

    info!(member_id = %member.id, new_member = created, "Magic link issued");

    let link = magic_link_url(&state.config.public_url, &token.token);
    let notification = Notification::magic_link(
        &member.email,
        member.name.as_deref(),
        &link,
        state.config.magic_link_ttl_minutes,
    );
    if let Err(e) = state.notifier.send(notification).await {
        // The token stays valid; the member can request another link
        warn!(member_id = %member.id, "Magic link delivery failed: {}", e);
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "If the address can receive email, a sign-in link is on its way" })),
    ))
}

/// POST /api/auth/verify
pub async fn verify_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<VerifyRequest>,
) -> ApiResult<Response> {
    exchange_token(&state, &req.token, &headers).await
}

/// GET /api/auth/verify?token=
pub async fn verify_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<VerifyQuery>,
) -> ApiResult<Response> {
    let token = query
        .token
        .ok_or_else(|| ApiError::BadRequest("token query parameter is required".to_string()))?;
    exchange_token(&state, &token, &headers).await
}

async fn exchange_token(state: &AppState, token: &str, headers: &HeaderMap) -> ApiResult<Response> {
    let token = token.trim();
    if !MagicLinkToken::is_well_formed(token) {
        return Err(ApiError::Unauthorized("Invalid sign-in link".to_string()));
    }

    let now = now();
    let stored = magic_links::find_by_hash(&state.db, &hash_token(token))
        .await?
        .ok_or_else(|| {
            warn!("Unknown magic link presented");
            ApiError::Unauthorized("Invalid sign-in link".to_string())
        })?;

    if let Err(e) = check_magic_link(stored.used_at, stored.expires_at, now) {
        warn!(member_id = %stored.member_id, "Magic link rejected: {}", e);
        return Err(ApiError::Unauthorized(e.to_string()));
    }

    // Atomic consumption: only one concurrent exchange can win
    if !magic_links::consume(&state.db, stored.id, now).await? {
        warn!(member_id = %stored.member_id, "Magic link replayed");
        return Err(ApiError::Unauthorized("Magic link has already been used".to_string()));
    }

    members::mark_signed_in(&state.db, stored.member_id, now).await?;
    let member = members::find_by_id(&state.db, stored.member_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Member no longer exists".to_string()))?;

    if state.config.is_super_admin_email(&member.email)
        && roles::ensure_super_admin(&state.db, member.id, now).await?
    {
        info!(member_id = %member.id, "Granted SUPER_ADMIN from configured bootstrap list");
    }

    let session_id = Uuid::new_v4();
    let expires_at = hours_after(now, state.config.session_ttl_hours);
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect::<String>());

    sessions::create(
        &state.db,
        session_id,
        member.id,
        user_agent.as_deref(),
        now,
        expires_at,
    )
    .await?;

    let claims = SessionClaims::new(session_id, member.id, now, expires_at);
    let session_token = encode_session(&claims, &state.session_secret)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    info!(member_id = %member.id, session_id = %session_id, "Member signed in");

    let cookie = session_cookie(
        &session_token,
        (expires_at - now).num_seconds(),
        state.config.cookie_secure,
    );
    let body = SessionResponse {
        token: session_token,
        expires_at: claims.expires_at(),
        member,
    };

    Ok(([(SET_COOKIE, cookie)], Json(body)).into_response())
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>, auth: AuthMember) -> ApiResult<Response> {
    sessions::revoke(&state.db, auth.session_id, now()).await?;
    info!(member_id = %auth.id(), session_id = %auth.session_id, "Session revoked");

    let cookie = clear_session_cookie(state.config.cookie_secure);
    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({ "message": "Signed out" })),
    )
        .into_response())
}

/// Build authentication routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/magic-link", post(request_magic_link))
        .route("/api/auth/verify", get(verify_get).post(verify_post))
        .route("/api/auth/logout", post(logout))
}
