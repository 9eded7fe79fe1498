//! Role assignment endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use commune_common::db::{MembershipStatus, RoleAssignment};
use commune_common::time::now;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::CommunityContext;
use crate::db::{members, memberships, roles};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, AuthMember};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub member_id: Uuid,
}

/// POST /api/communities/:id/roles (manage)
///
/// Only ACTIVE members of the community can become its admin.
pub async fn grant_community_admin(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<GrantRequest>,
) -> ApiResult<(StatusCode, Json<RoleAssignment>)> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    ctx.require_manage(&auth)?;

    match memberships::status_of(&state.db, req.member_id, id).await? {
        Some(MembershipStatus::Active) => {}
        Some(status) => {
            return Err(ApiError::BadRequest(format!(
                "Member must be ACTIVE to become an admin (currently {})",
                status
            )))
        }
        None => {
            return Err(ApiError::BadRequest(
                "Member does not belong to this community".to_string(),
            ))
        }
    }

    let assignment =
        roles::grant_community_admin(&state.db, req.member_id, id, auth.id(), now()).await?;
    info!(community_id = %id, member_id = %req.member_id, by = %auth.id(), "COMMUNITY_ADMIN granted");

    Ok((StatusCode::CREATED, Json(assignment)))
}

/// DELETE /api/communities/:id/roles/:member_id (manage)
pub async fn revoke_community_admin(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath((id, member_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    ctx.require_manage(&auth)?;

    roles::revoke_community_admin(&state.db, member_id, id).await?;
    info!(community_id = %id, member_id = %member_id, by = %auth.id(), "COMMUNITY_ADMIN revoked");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/super-admins (SUPER_ADMIN)
pub async fn grant_super_admin(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiJson(req): ApiJson<GrantRequest>,
) -> ApiResult<(StatusCode, Json<RoleAssignment>)> {
    auth.access.require_super_admin()?;

    members::find_by_id(&state.db, req.member_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Member {}", req.member_id)))?;

    let assignment =
        roles::grant_super_admin(&state.db, req.member_id, Some(auth.id()), now()).await?;
    info!(member_id = %req.member_id, by = %auth.id(), "SUPER_ADMIN granted");

    Ok((StatusCode::CREATED, Json(assignment)))
}

/// DELETE /api/admin/super-admins/:member_id (SUPER_ADMIN)
pub async fn revoke_super_admin(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(member_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    auth.access.require_super_admin()?;

    roles::revoke_super_admin(&state.db, member_id).await?;
    info!(member_id = %member_id, by = %auth.id(), "SUPER_ADMIN revoked");

    Ok(StatusCode::NO_CONTENT)
}

/// Build role assignment routes
pub fn role_routes() -> Router<AppState> {
    Router::new()
        .route("/api/communities/:id/roles", post(grant_community_admin))
        .route(
            "/api/communities/:id/roles/:member_id",
            delete(revoke_community_admin),
        )
        .route("/api/admin/super-admins", post(grant_super_admin))
        .route(
            "/api/admin/super-admins/:member_id",
            delete(revoke_super_admin),
        )
}
