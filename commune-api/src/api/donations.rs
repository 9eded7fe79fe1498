//! Donation and donation goal endpoints
//!
//! Donor identity on anonymous donations is visible only to community
//! managers and to the donor. Statistics are computed from stored donations.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use commune_common::db::{Donation, DonationGoal, DonationStatus, MembershipStatus};
use commune_common::time::now;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{optional_text, parse_filter, required_text, CommunityContext};
use crate::db::donations::{self, DonationEntry, DonationTotals, GoalProgress, MonthlyTotal};
use crate::db::memberships;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthMember};
use crate::pagination::{calculate_pagination, Page};
use crate::AppState;

const MAX_TITLE_CHARS: usize = 200;
const MAX_MESSAGE_CHARS: usize = 1000;
/// One billion in major currency units
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;

/// Amount in cents within `1..=MAX_AMOUNT_CENTS`
fn check_amount(field: &str, cents: i64) -> ApiResult<i64> {
    if cents <= 0 {
        return Err(ApiError::BadRequest(format!("{} must be positive", field)));
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(ApiError::BadRequest(format!(
            "{} must be at most {}",
            field, MAX_AMOUNT_CENTS
        )));
    }
    Ok(cents)
}

#[derive(Debug, Deserialize)]
pub struct DonationQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDonation {
    pub amount_cents: i64,
    pub goal_id: Option<Uuid>,
    #[serde(default)]
    pub anonymous: bool,
    pub message: Option<String>,
    /// Record as already received (managers only)
    #[serde(default)]
    pub received: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: DonationStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreateGoal {
    pub title: String,
    pub description: Option<String>,
    pub target_cents: i64,
    pub deadline: Option<NaiveDate>,
}

/// A donation as shown to a particular viewer
#[derive(Debug, Serialize)]
pub struct DonationView {
    pub id: Uuid,
    pub community_id: Uuid,
    pub goal_id: Option<Uuid>,
    pub donor_id: Option<Uuid>,
    pub donor_name: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub anonymous: bool,
    pub message: Option<String>,
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DonationView {
    /// Hide the donor of an anonymous donation unless `reveal` is set
    fn new(entry: DonationEntry, reveal: bool) -> Self {
        let DonationEntry {
            donation,
            donor_name,
        } = entry;
        let hide = donation.anonymous && !reveal;

        Self {
            id: donation.id,
            community_id: donation.community_id,
            goal_id: donation.goal_id,
            donor_id: if hide { None } else { donation.donor_id },
            donor_name: if hide { None } else { donor_name },
            amount_cents: donation.amount_cents,
            currency: donation.currency,
            anonymous: donation.anonymous,
            message: donation.message,
            status: donation.status,
            created_at: donation.created_at,
            updated_at: donation.updated_at,
        }
    }

    /// Reveal for managers and for the donor themself
    fn for_viewer(entry: DonationEntry, viewer: Uuid, manager: bool) -> Self {
        let reveal = manager || entry.donation.donor_id == Some(viewer);
        Self::new(entry, reveal)
    }
}

#[derive(Debug, Serialize)]
pub struct GoalView {
    #[serde(flatten)]
    pub goal: DonationGoal,
    pub progress: GoalProgress,
}

#[derive(Debug, Serialize)]
pub struct DonationSummary {
    pub community_id: Uuid,
    pub currency: String,
    #[serde(flatten)]
    pub totals: DonationTotals,
    pub by_month: Vec<MonthlyTotal>,
    pub goals: Vec<GoalView>,
}

async fn goals_with_progress(state: &AppState, community_id: Uuid) -> ApiResult<Vec<GoalView>> {
    let goals = donations::list_goals(&state.db, community_id).await?;
    let sums = donations::goal_sums(&state.db, community_id).await?;

    Ok(goals
        .into_iter()
        .map(|goal| {
            let (received, pledged) = sums.get(&goal.id).copied().unwrap_or((0, 0));
            let progress = GoalProgress::new(received, pledged, goal.target_cents);
            GoalView { goal, progress }
        })
        .collect())
}

/// POST /api/communities/:id/donations (ACTIVE members)
pub async fn create_donation(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateDonation>,
) -> ApiResult<(StatusCode, Json<DonationView>)> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    let manager = ctx.can_manage(&auth);

    let status = memberships::status_of(&state.db, auth.id(), id).await?;
    if status != Some(MembershipStatus::Active) {
        return Err(ApiError::Forbidden(
            "Only active members can donate to this community".to_string(),
        ));
    }

    check_amount("amount_cents", req.amount_cents)?;
    if req.received && !manager {
        return Err(ApiError::Forbidden(
            "Only community managers can record received donations".to_string(),
        ));
    }

    if let Some(goal_id) = req.goal_id {
        let goal = donations::find_goal(&state.db, goal_id)
            .await?
            .filter(|g| g.community_id == id)
            .ok_or_else(|| {
                ApiError::BadRequest("Goal does not belong to this community".to_string())
            })?;
        if !goal.is_open() {
            return Err(ApiError::BadRequest("Goal is closed".to_string()));
        }
    }

    let message = optional_text(req.message);
    if let Some(m) = &message {
        if m.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ApiError::BadRequest(format!(
                "message must be at most {} characters",
                MAX_MESSAGE_CHARS
            )));
        }
    }

    let created_at = now();
    let donation = Donation {
        id: Uuid::new_v4(),
        community_id: id,
        goal_id: req.goal_id,
        donor_id: Some(auth.id()),
        amount_cents: req.amount_cents,
        currency: ctx.community.currency.clone(),
        anonymous: req.anonymous,
        message,
        status: if req.received {
            DonationStatus::Received
        } else {
            DonationStatus::Pledged
        },
        created_at,
        updated_at: created_at,
    };

    donations::create_donation(&state.db, &donation).await?;
    info!(
        community_id = %id,
        donation_id = %donation.id,
        amount_cents = donation.amount_cents,
        status = %donation.status,
        "Donation recorded"
    );

    let entry = DonationEntry {
        donation,
        donor_name: auth.member.name.clone(),
    };
    Ok((StatusCode::CREATED, Json(DonationView::new(entry, true))))
}

/// GET /api/communities/:id/donations
pub async fn list_donations(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<DonationQuery>,
) -> ApiResult<Json<Page<DonationView>>> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    ctx.require_view(&state.db, &auth).await?;
    let manager = ctx.can_manage(&auth);

    let status = parse_filter::<DonationStatus>(query.status.as_deref())?;
    let total = donations::count_donations(&state.db, id, status).await?;
    let pagination = calculate_pagination(total, query.page, query.page_size);
    let items =
        donations::list_donations(&state.db, id, status, pagination.page_size, pagination.offset)
            .await?;

    let viewer = auth.id();
    let page = Page::new(items, total, pagination)
        .map(|entry| DonationView::for_viewer(entry, viewer, manager));
    Ok(Json(page))
}

/// PATCH /api/donations/:id/status (manage)
///
/// Only pledges move: PLEDGED -> RECEIVED or CANCELLED.
pub async fn update_donation_status(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StatusUpdate>,
) -> ApiResult<Json<DonationView>> {
    let entry = donations::find_donation(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Donation {}", id)))?;
    let ctx = CommunityContext::load(&state.db, entry.donation.community_id).await?;
    ctx.require_manage(&auth)?;

    let from = entry.donation.status;
    if !from.can_transition_to(req.status) {
        return Err(ApiError::Conflict(format!(
            "Cannot change donation from {} to {}",
            from, req.status
        )));
    }

    let updated_at = now();
    if !donations::transition_status(&state.db, id, from, req.status, updated_at).await? {
        return Err(ApiError::Conflict(
            "Donation status changed concurrently".to_string(),
        ));
    }
    info!(donation_id = %id, from = %from, to = %req.status, by = %auth.id(), "Donation status changed");

    let mut entry = entry;
    entry.donation.status = req.status;
    entry.donation.updated_at = updated_at;
    Ok(Json(DonationView::new(entry, true)))
}

/// POST /api/communities/:id/goals (manage)
pub async fn create_goal(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateGoal>,
) -> ApiResult<(StatusCode, Json<GoalView>)> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    ctx.require_manage(&auth)?;

    check_amount("target_cents", req.target_cents)?;

    let goal = DonationGoal {
        id: Uuid::new_v4(),
        community_id: id,
        title: required_text("title", &req.title, MAX_TITLE_CHARS)?,
        description: optional_text(req.description),
        target_cents: req.target_cents,
        deadline: req.deadline,
        closed_at: None,
        created_by: Some(auth.id()),
        created_at: now(),
    };

    donations::create_goal(&state.db, &goal).await?;
    info!(community_id = %id, goal_id = %goal.id, target_cents = goal.target_cents, "Donation goal created");

    let progress = GoalProgress::new(0, 0, goal.target_cents);
    Ok((StatusCode::CREATED, Json(GoalView { goal, progress })))
}

/// GET /api/communities/:id/goals
pub async fn list_goals(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<GoalView>>> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    ctx.require_view(&state.db, &auth).await?;

    Ok(Json(goals_with_progress(&state, id).await?))
}

/// POST /api/goals/:id/close (manage)
pub async fn close_goal(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<DonationGoal>> {
    let mut goal = donations::find_goal(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Goal {}", id)))?;
    let ctx = CommunityContext::load(&state.db, goal.community_id).await?;
    ctx.require_manage(&auth)?;

    let closed_at = now();
    if !donations::close_goal(&state.db, id, closed_at).await? {
        return Err(ApiError::Conflict("Goal is already closed".to_string()));
    }
    info!(goal_id = %id, by = %auth.id(), "Donation goal closed");

    goal.closed_at = Some(closed_at);
    Ok(Json(goal))
}

/// GET /api/communities/:id/donations/summary (manage)
pub async fn donation_summary(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<DonationSummary>> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    ctx.require_manage(&auth)?;

    let totals = donations::totals(&state.db, id).await?;
    let by_month = donations::monthly(&state.db, id).await?;
    let goals = goals_with_progress(&state, id).await?;

    Ok(Json(DonationSummary {
        community_id: id,
        currency: ctx.community.currency,
        totals,
        by_month,
        goals,
    }))
}

/// Build donation routes
pub fn donation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/communities/:id/donations",
            get(list_donations).post(create_donation),
        )
        .route("/api/communities/:id/donations/summary", get(donation_summary))
        .route("/api/donations/:id/status", patch(update_donation_status))
        .route("/api/communities/:id/goals", get(list_goals).post(create_goal))
        .route("/api/goals/:id/close", post(close_goal))
}
