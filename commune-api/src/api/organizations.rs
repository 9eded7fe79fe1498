//! Organization endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use commune_common::db::Organization;
use commune_common::time::now;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{optional_text, required_text};
use crate::db::communities::{self, CommunitySummary};
use crate::db::organizations;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthMember};
use crate::pagination::{calculate_pagination, Page};
use crate::AppState;

const MAX_NAME_CHARS: usize = 120;

#[derive(Debug, Deserialize)]
pub struct OrganizationQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrganization {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrganizationDetail {
    #[serde(flatten)]
    pub organization: Organization,
    pub communities: Vec<CommunitySummary>,
}

/// GET /api/organizations
pub async fn list_organizations(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<OrganizationQuery>,
) -> ApiResult<Json<Page<Organization>>> {
    let total = organizations::count(&state.db, query.q.as_deref()).await?;
    let pagination = calculate_pagination(total, query.page, query.page_size);
    let items = organizations::list(
        &state.db,
        query.q.as_deref(),
        pagination.page_size,
        pagination.offset,
    )
    .await?;

    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /api/organizations/:id
pub async fn get_organization(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<OrganizationDetail>> {
    let organization = organizations::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Organization {}", id)))?;
    let communities = communities::top_level(&state.db, id).await?;

    Ok(Json(OrganizationDetail {
        organization,
        communities,
    }))
}

/// POST /api/organizations (SUPER_ADMIN)
pub async fn create_organization(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiJson(req): ApiJson<CreateOrganization>,
) -> ApiResult<(StatusCode, Json<Organization>)> {
    auth.access.require_super_admin()?;

    let name = required_text("name", &req.name, MAX_NAME_CHARS)?;
    if organizations::name_exists(&state.db, &name).await? {
        return Err(ApiError::Conflict(format!("Organization '{}' already exists", name)));
    }

    let organization =
        organizations::create(&state.db, &name, optional_text(req.description).as_deref(), now())
            .await?;
    info!(organization_id = %organization.id, by = %auth.id(), "Organization created");

    Ok((StatusCode::CREATED, Json(organization)))
}

/// Build organization routes
pub fn organization_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/organizations",
            get(list_organizations).post(create_organization),
        )
        .route("/api/organizations/:id", get(get_organization))
}
