//! HTTP API handlers for commune-api

pub mod auth;
pub mod communities;
pub mod donations;
pub mod health;
pub mod marketplace;
pub mod members;
pub mod minutes;
pub mod organizations;
pub mod roles;

pub use auth::auth_routes;
pub use communities::community_routes;
pub use donations::donation_routes;
pub use health::health_routes;
pub use marketplace::marketplace_routes;
pub use members::member_routes;
pub use minutes::minutes_routes;
pub use organizations::organization_routes;
pub use roles::role_routes;

use commune_common::db::{Community, MembershipStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{communities as community_db, memberships};
use crate::error::{ApiError, ApiResult};
use crate::extract::AuthMember;

/// A community together with its lineage (itself, then ancestors)
pub(crate) struct CommunityContext {
    pub community: Community,
    pub lineage: Vec<Uuid>,
}

impl CommunityContext {
    /// Load a community or fail with 404
    pub async fn load(db: &SqlitePool, id: Uuid) -> ApiResult<Self> {
        let community = community_db::find_by_id(db, id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Community {}", id)))?;
        let lineage = community_db::lineage(db, id).await?;
        Ok(Self { community, lineage })
    }

    pub fn id(&self) -> Uuid {
        self.community.id
    }

    pub fn can_manage(&self, auth: &AuthMember) -> bool {
        auth.access.can_manage(&self.lineage)
    }

    pub fn require_manage(&self, auth: &AuthMember) -> ApiResult<()> {
        Ok(auth.access.require_manage(&self.lineage)?)
    }

    /// Managers and ACTIVE members; returns the caller's membership status
    pub async fn require_view(
        &self,
        db: &SqlitePool,
        auth: &AuthMember,
    ) -> ApiResult<Option<MembershipStatus>> {
        let status = memberships::status_of(db, auth.id(), self.id()).await?;
        auth.access.require_view_internals(&self.lineage, status)?;
        Ok(status)
    }
}

/// Trimmed text that must be present and at most `max_chars` long
pub(crate) fn required_text(field: &str, value: &str, max_chars: usize) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }
    if value.chars().count() > max_chars {
        return Err(ApiError::BadRequest(format!(
            "{} must be at most {} characters",
            field, max_chars
        )));
    }
    Ok(value.to_string())
}

/// Trimmed optional text; blank becomes `None`
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an optional enum-valued query parameter
pub(crate) fn parse_filter<T>(value: Option<&str>) -> ApiResult<Option<T>>
where
    T: std::str::FromStr<Err = commune_common::Error>,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Ok(Some(v.parse::<T>()?)),
        None => Ok(None),
    }
}
