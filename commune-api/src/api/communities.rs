//! Community endpoints: listing, detail, creation and the branch hierarchy

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use commune_common::db::{Community, MembershipStatus, Organization};
use commune_common::time::now;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{optional_text, required_text, CommunityContext};
use crate::db::communities::{self, CommunityFilter, CommunitySummary, NewCommunity};
use crate::db::members::MemberSummary;
use crate::db::{memberships, organizations};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthMember, OptionalAuthMember};
use crate::pagination::{calculate_pagination, Page};
use crate::AppState;

const MAX_NAME_CHARS: usize = 120;
const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Deserialize)]
pub struct CommunityQuery {
    pub q: Option<String>,
    pub organization_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommunity {
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub requires_approval: bool,
    /// ISO 4217 code; branches default to their parent's currency
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommunity {
    pub name: Option<String>,
    /// Empty string clears
    pub description: Option<String>,
    /// Empty string clears
    pub location: Option<String>,
    pub requires_approval: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SetParent {
    pub parent_id: Option<Uuid>,
}

/// What the signed-in viewer may do with a community
#[derive(Debug, Serialize)]
pub struct ViewerInfo {
    pub membership_status: Option<MembershipStatus>,
    pub can_manage: bool,
}

#[derive(Debug, Serialize)]
pub struct CommunityDetail {
    #[serde(flatten)]
    pub community: Community,
    pub organization: Organization,
    pub parent: Option<CommunitySummary>,
    pub branches: Vec<CommunitySummary>,
    pub admins: Vec<MemberSummary>,
    pub member_count: i64,
    pub viewer: Option<ViewerInfo>,
}

fn normalize_currency(raw: &str) -> ApiResult<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(code)
    } else {
        Err(ApiError::BadRequest(format!("Invalid currency code: {}", raw)))
    }
}

/// GET /api/communities
pub async fn list_communities(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CommunityQuery>,
) -> ApiResult<Json<Page<CommunitySummary>>> {
    let filter = CommunityFilter {
        q: query.q,
        organization_id: query.organization_id,
        parent_id: query.parent_id,
        top_level_only: false,
    };

    let total = communities::count(&state.db, &filter).await?;
    let pagination = calculate_pagination(total, query.page, query.page_size);
    let items =
        communities::list(&state.db, &filter, pagination.page_size, pagination.offset).await?;

    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /api/communities/:id
pub async fn get_community(
    State(state): State<AppState>,
    viewer: OptionalAuthMember,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<CommunityDetail>> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    let community = ctx.community.clone();

    let organization = organizations::find_by_id(&state.db, community.organization_id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("Community {} has no organization", id)))?;
    let parent = match community.parent_id {
        Some(parent_id) => communities::find_summary(&state.db, parent_id).await?,
        None => None,
    };
    let branches = communities::branches(&state.db, id).await?;
    let admins = communities::admins(&state.db, id).await?;
    let member_count =
        memberships::count_for_community(&state.db, id, Some(MembershipStatus::Active)).await?;

    let viewer = match viewer.0 {
        Some(auth) => Some(ViewerInfo {
            membership_status: memberships::status_of(&state.db, auth.id(), id).await?,
            can_manage: ctx.can_manage(&auth),
        }),
        None => None,
    };

    Ok(Json(CommunityDetail {
        community,
        organization,
        parent,
        branches,
        admins,
        member_count,
        viewer,
    }))
}

/// GET /api/communities/:id/branches
pub async fn list_branches(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<CommunitySummary>>> {
    CommunityContext::load(&state.db, id).await?;
    Ok(Json(communities::branches(&state.db, id).await?))
}

/// POST /api/communities
///
/// The creator becomes an ACTIVE member and COMMUNITY_ADMIN. Creating a
/// branch requires managing the parent.
pub async fn create_community(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiJson(req): ApiJson<CreateCommunity>,
) -> ApiResult<(StatusCode, Json<Community>)> {
    let name = required_text("name", &req.name, MAX_NAME_CHARS)?;

    organizations::find_by_id(&state.db, req.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Organization {}", req.organization_id)))?;

    let parent = match req.parent_id {
        Some(parent_id) => {
            let parent = CommunityContext::load(&state.db, parent_id).await?;
            if parent.community.organization_id != req.organization_id {
                return Err(ApiError::BadRequest(
                    "Parent community belongs to a different organization".to_string(),
                ));
            }
            parent.require_manage(&auth)?;
            Some(parent.community)
        }
        None => None,
    };

    let currency = match (&req.currency, &parent) {
        (Some(code), _) => normalize_currency(code)?,
        (None, Some(parent)) => parent.currency.clone(),
        (None, None) => DEFAULT_CURRENCY.to_string(),
    };

    if communities::name_taken(&state.db, req.organization_id, &name, None).await? {
        return Err(ApiError::Conflict(format!(
            "A community named '{}' already exists in this organization",
            name
        )));
    }

    let community = communities::create_with_founder(
        &state.db,
        NewCommunity {
            organization_id: req.organization_id,
            parent_id: req.parent_id,
            name,
            description: optional_text(req.description),
            location: optional_text(req.location),
            requires_approval: req.requires_approval,
            currency,
        },
        auth.id(),
        now(),
    )
    .await?;

    info!(community_id = %community.id, parent_id = ?community.parent_id, by = %auth.id(), "Community created");

    Ok((StatusCode::CREATED, Json(community)))
}

/// PATCH /api/communities/:id
pub async fn update_community(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateCommunity>,
) -> ApiResult<Json<Community>> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    ctx.require_manage(&auth)?;

    let mut community = ctx.community;
    if let Some(name) = req.name {
        let name = required_text("name", &name, MAX_NAME_CHARS)?;
        if communities::name_taken(&state.db, community.organization_id, &name, Some(id)).await? {
            return Err(ApiError::Conflict(format!(
                "A community named '{}' already exists in this organization",
                name
            )));
        }
        community.name = name;
    }
    if req.description.is_some() {
        community.description = optional_text(req.description);
    }
    if req.location.is_some() {
        community.location = optional_text(req.location);
    }
    if let Some(requires_approval) = req.requires_approval {
        community.requires_approval = requires_approval;
    }

    let updated_at = now();
    communities::update(&state.db, &community, updated_at).await?;
    community.updated_at = updated_at;

    Ok(Json(community))
}

/// PUT /api/communities/:id/parent
///
/// Moving a community requires managing it, its current parent (if any) and
/// the new parent (if any). The new parent may not be the community itself or
/// one of its descendants.
pub async fn set_parent(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<SetParent>,
) -> ApiResult<Json<Community>> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    ctx.require_manage(&auth)?;
    if ctx.lineage.len() > 1 {
        auth.access.require_manage(&ctx.lineage[1..])?;
    }

    if let Some(parent_id) = req.parent_id {
        if parent_id == id {
            return Err(ApiError::BadRequest(
                "A community cannot be its own parent".to_string(),
            ));
        }
        let parent = CommunityContext::load(&state.db, parent_id).await?;
        if parent.community.organization_id != ctx.community.organization_id {
            return Err(ApiError::BadRequest(
                "Parent community belongs to a different organization".to_string(),
            ));
        }
        parent.require_manage(&auth)?;
        if parent.lineage.contains(&id) {
            return Err(ApiError::BadRequest(
                "Cannot move a community under one of its own branches".to_string(),
            ));
        }
    }

    let updated_at = now();
    communities::set_parent(&state.db, id, req.parent_id, updated_at).await?;
    info!(community_id = %id, parent_id = ?req.parent_id, by = %auth.id(), "Community moved");

    let mut community = ctx.community;
    community.parent_id = req.parent_id;
    community.updated_at = updated_at;
    Ok(Json(community))
}

/// DELETE /api/communities/:id (SUPER_ADMIN)
pub async fn delete_community(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    auth.access.require_super_admin()?;
    CommunityContext::load(&state.db, id).await?;

    if communities::branch_count(&state.db, id).await? > 0 {
        return Err(ApiError::Conflict(
            "Community still has branches; move or delete them first".to_string(),
        ));
    }

    communities::delete(&state.db, id).await?;
    info!(community_id = %id, by = %auth.id(), "Community deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Build community routes
pub fn community_routes() -> Router<AppState> {
    Router::new()
        .route("/api/communities", get(list_communities).post(create_community))
        .route(
            "/api/communities/:id",
            get(get_community)
                .patch(update_community)
                .delete(delete_community),
        )
        .route("/api/communities/:id/branches", get(list_branches))
        .route("/api/communities/:id/parent", put(set_parent))
}
