//! Membership lifecycle and member profile endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use commune_common::db::{Member, Membership, MembershipStatus, RoleAssignment};
use commune_common::time::now;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::{optional_text, parse_filter, CommunityContext};
use crate::db::memberships::{self, CommunityMemberEntry, MemberCommunityEntry};
use crate::db::{members, roles};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthMember};
use crate::notify::Notification;
use crate::pagination::{calculate_pagination, Page};
use crate::AppState;

const MAX_NAME_CHARS: usize = 120;
const MAX_PHONE_CHARS: usize = 40;
const MAX_BIO_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct MemberListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: MembershipStatus,
}

#[derive(Debug, Deserialize)]
pub struct PrimaryChange {
    pub community_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    /// Empty string clears
    pub name: Option<String>,
    /// Empty string clears
    pub phone: Option<String>,
    /// Empty string clears
    pub bio: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub member: Member,
    pub primary_community_id: Option<Uuid>,
    pub memberships: Vec<MemberCommunityEntry>,
    pub roles: Vec<RoleAssignment>,
}

/// What other signed-in members may see
#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub member_since: DateTime<Utc>,
}

/// Tell a member about a status change; failures are only logged
async fn notify_status(state: &AppState, member_id: Uuid, community_name: &str, status: MembershipStatus) {
    let member = match members::find_by_id(&state.db, member_id).await {
        Ok(Some(member)) => member,
        Ok(None) => return,
        Err(e) => {
            warn!(member_id = %member_id, "Cannot load member for notification: {}", e);
            return;
        }
    };

    let notification = Notification::membership_status(&member.email, community_name, status.as_str());
    if let Err(e) = state.notifier.send(notification).await {
        warn!(member_id = %member_id, "Membership notification failed: {}", e);
    }
}

/// POST /api/communities/:id/join
///
/// New (or INACTIVE) memberships start PENDING when the community requires
/// approval, otherwise ACTIVE. Managers are never held for approval.
pub async fn join_community(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<(StatusCode, Json<Membership>)> {
    let ctx = CommunityContext::load(&state.db, id).await?;

    match memberships::status_of(&state.db, auth.id(), id).await? {
        Some(MembershipStatus::Suspended) => {
            return Err(ApiError::Forbidden(
                "Your membership in this community is suspended".to_string(),
            ))
        }
        Some(MembershipStatus::Active) => {
            return Err(ApiError::Conflict("Already a member of this community".to_string()))
        }
        Some(MembershipStatus::Pending) => {
            return Err(ApiError::Conflict(
                "Membership request is already awaiting approval".to_string(),
            ))
        }
        Some(MembershipStatus::Inactive) | None => {}
    }

    let status = if ctx.community.requires_approval && !ctx.can_manage(&auth) {
        MembershipStatus::Pending
    } else {
        MembershipStatus::Active
    };

    let membership = memberships::join(&state.db, auth.id(), id, status, now()).await?;
    info!(community_id = %id, member_id = %auth.id(), status = %status, "Member joined community");

    Ok((StatusCode::CREATED, Json(membership)))
}

/// GET /api/communities/:id/members (managers and ACTIVE members)
pub async fn list_members(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<MemberListQuery>,
) -> ApiResult<Json<Page<CommunityMemberEntry>>> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    ctx.require_view(&state.db, &auth).await?;
    let show_email = ctx.can_manage(&auth);

    let status = parse_filter::<MembershipStatus>(query.status.as_deref())?;
    let total = memberships::count_for_community(&state.db, id, status).await?;
    let pagination = calculate_pagination(total, query.page, query.page_size);
    let items = memberships::list_for_community(
        &state.db,
        id,
        status,
        pagination.page_size,
        pagination.offset,
    )
    .await?;

    let page = Page::new(items, total, pagination).map(|mut entry| {
        if !show_email {
            entry.email = None;
        }
        entry
    });
    Ok(Json(page))
}

/// PATCH /api/communities/:id/members/:member_id/status (manage)
pub async fn update_member_status(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath((id, member_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<StatusChange>,
) -> ApiResult<Json<Membership>> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    ctx.require_manage(&auth)?;

    if member_id == auth.id() {
        return Err(ApiError::BadRequest(
            "You cannot change your own membership status".to_string(),
        ));
    }

    let current = memberships::find(&state.db, member_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Membership not found".to_string()))?;
    if current.status == req.status {
        return Ok(Json(current));
    }

    let membership = memberships::set_status(&state.db, member_id, id, req.status, now()).await?;
    info!(
        community_id = %id,
        member_id = %member_id,
        from = %current.status,
        to = %req.status,
        by = %auth.id(),
        "Membership status changed"
    );

    notify_status(&state, member_id, &ctx.community.name, req.status).await;

    Ok(Json(membership))
}

/// DELETE /api/communities/:id/members/:member_id (self or manage)
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath((id, member_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    if member_id != auth.id() {
        ctx.require_manage(&auth)?;
    }

    let membership = memberships::find(&state.db, member_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Membership not found".to_string()))?;

    // Leaving would erase the suspension and let the member rejoin
    if member_id == auth.id() && membership.status == MembershipStatus::Suspended {
        return Err(ApiError::Forbidden(
            "A suspended membership cannot be withdrawn".to_string(),
        ));
    }

    memberships::remove(&state.db, member_id, id, now()).await?;
    info!(community_id = %id, member_id = %member_id, by = %auth.id(), "Membership removed");

    Ok(StatusCode::NO_CONTENT)
}

async fn me_response(state: &AppState, member: Member) -> ApiResult<MeResponse> {
    let memberships = memberships::list_for_member(&state.db, member.id).await?;
    let roles = roles::for_member(&state.db, member.id).await?;
    let primary_community_id = memberships
        .iter()
        .find(|m| m.is_primary)
        .map(|m| m.community_id);

    Ok(MeResponse {
        member,
        primary_community_id,
        memberships,
        roles,
    })
}

/// GET /api/me
pub async fn get_me(State(state): State<AppState>, auth: AuthMember) -> ApiResult<Json<MeResponse>> {
    Ok(Json(me_response(&state, auth.member).await?))
}

fn profile_field(field: &str, value: Option<String>, max_chars: usize) -> ApiResult<Option<String>> {
    let value = optional_text(value);
    if let Some(v) = &value {
        if v.chars().count() > max_chars {
            return Err(ApiError::BadRequest(format!(
                "{} must be at most {} characters",
                field, max_chars
            )));
        }
    }
    Ok(value)
}

/// PATCH /api/me
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiJson(req): ApiJson<ProfileUpdate>,
) -> ApiResult<Json<MeResponse>> {
    let mut member = auth.member;
    if req.name.is_some() {
        member.name = profile_field("name", req.name, MAX_NAME_CHARS)?;
    }
    if req.phone.is_some() {
        member.phone = profile_field("phone", req.phone, MAX_PHONE_CHARS)?;
    }
    if req.bio.is_some() {
        member.bio = profile_field("bio", req.bio, MAX_BIO_CHARS)?;
    }

    let updated_at = now();
    members::update_profile(&state.db, &member, updated_at).await?;
    member.updated_at = updated_at;

    Ok(Json(me_response(&state, member).await?))
}

/// GET /api/me/communities
pub async fn my_communities(
    State(state): State<AppState>,
    auth: AuthMember,
) -> ApiResult<Json<Vec<MemberCommunityEntry>>> {
    Ok(Json(memberships::list_for_member(&state.db, auth.id()).await?))
}

/// PUT /api/me/primary
pub async fn set_primary_community(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiJson(req): ApiJson<PrimaryChange>,
) -> ApiResult<Json<Vec<MemberCommunityEntry>>> {
    memberships::set_primary(&state.db, auth.id(), req.community_id, now()).await?;
    info!(member_id = %auth.id(), community_id = %req.community_id, "Primary community changed");

    Ok(Json(memberships::list_for_member(&state.db, auth.id()).await?))
}

/// GET /api/members/:id
pub async fn get_member(
    State(state): State<AppState>,
    _auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<PublicProfile>> {
    let member = members::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Member {}", id)))?;

    Ok(Json(PublicProfile {
        id: member.id,
        name: member.name,
        bio: member.bio,
        member_since: member.created_at,
    }))
}

/// Build membership and profile routes
pub fn member_routes() -> Router<AppState> {
    Router::new()
        .route("/api/communities/:id/join", post(join_community))
        .route("/api/communities/:id/members", get(list_members))
        .route(
            "/api/communities/:id/members/:member_id/status",
            patch(update_member_status),
        )
        .route("/api/communities/:id/members/:member_id", delete(remove_member))
        .route("/api/me", get(get_me).patch(update_me))
        .route("/api/me/communities", get(my_communities))
        .route("/api/me/primary", put(set_primary_community))
        .route("/api/members/:id", get(get_member))
}
