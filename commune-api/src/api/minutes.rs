//! Meeting minutes endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use commune_common::db::MeetingMinutes;
use commune_common::time::now;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{optional_text, required_text, CommunityContext};
use crate::db::minutes;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthMember};
use crate::pagination::{calculate_pagination, Page};
use crate::AppState;

const MAX_TITLE_CHARS: usize = 200;
const MAX_ATTENDEE_CHARS: usize = 120;

#[derive(Debug, Deserialize)]
pub struct MinutesQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMinutes {
    pub title: String,
    pub meeting_date: NaiveDate,
    #[serde(default)]
    pub attendees: Vec<String>,
    pub agenda: Option<String>,
    pub content: String,
    pub decisions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMinutes {
    pub title: Option<String>,
    pub meeting_date: Option<NaiveDate>,
    pub attendees: Option<Vec<String>>,
    /// Empty string clears
    pub agenda: Option<String>,
    pub content: Option<String>,
    /// Empty string clears
    pub decisions: Option<String>,
}

/// Trim attendee names and drop blanks
fn clean_attendees(attendees: Vec<String>) -> ApiResult<Vec<String>> {
    let mut cleaned = Vec::with_capacity(attendees.len());
    for name in attendees {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if name.chars().count() > MAX_ATTENDEE_CHARS {
            return Err(ApiError::BadRequest(format!(
                "Attendee names must be at most {} characters",
                MAX_ATTENDEE_CHARS
            )));
        }
        cleaned.push(name.to_string());
    }
    Ok(cleaned)
}

fn required_content(value: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest("content is required".to_string()));
    }
    Ok(value.to_string())
}

async fn load_minutes(state: &AppState, id: Uuid) -> ApiResult<(MeetingMinutes, CommunityContext)> {
    let record = minutes::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Minutes {}", id)))?;
    let ctx = CommunityContext::load(&state.db, record.community_id).await?;
    Ok((record, ctx))
}

/// GET /api/communities/:id/minutes
pub async fn list_minutes(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<MinutesQuery>,
) -> ApiResult<Json<Page<MeetingMinutes>>> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    ctx.require_view(&state.db, &auth).await?;

    let total = minutes::count_for_community(&state.db, id).await?;
    let pagination = calculate_pagination(total, query.page, query.page_size);
    let items =
        minutes::list_for_community(&state.db, id, pagination.page_size, pagination.offset).await?;

    Ok(Json(Page::new(items, total, pagination)))
}

/// POST /api/communities/:id/minutes (manage)
pub async fn create_minutes(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateMinutes>,
) -> ApiResult<(StatusCode, Json<MeetingMinutes>)> {
    let ctx = CommunityContext::load(&state.db, id).await?;
    ctx.require_manage(&auth)?;

    let created_at = now();
    let record = MeetingMinutes {
        id: Uuid::new_v4(),
        community_id: id,
        title: required_text("title", &req.title, MAX_TITLE_CHARS)?,
        meeting_date: req.meeting_date,
        attendees: clean_attendees(req.attendees)?,
        agenda: optional_text(req.agenda),
        content: required_content(&req.content)?,
        decisions: optional_text(req.decisions),
        created_by: Some(auth.id()),
        created_at,
        updated_at: created_at,
    };

    minutes::create(&state.db, &record).await?;
    info!(community_id = %id, minutes_id = %record.id, by = %auth.id(), "Minutes recorded");

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/minutes/:id
pub async fn get_minutes(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<MeetingMinutes>> {
    let (record, ctx) = load_minutes(&state, id).await?;
    ctx.require_view(&state.db, &auth).await?;
    Ok(Json(record))
}

/// PATCH /api/minutes/:id (manage)
pub async fn update_minutes(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateMinutes>,
) -> ApiResult<Json<MeetingMinutes>> {
    let (mut record, ctx) = load_minutes(&state, id).await?;
    ctx.require_manage(&auth)?;

    if let Some(title) = req.title {
        record.title = required_text("title", &title, MAX_TITLE_CHARS)?;
    }
    if let Some(meeting_date) = req.meeting_date {
        record.meeting_date = meeting_date;
    }
    if let Some(attendees) = req.attendees {
        record.attendees = clean_attendees(attendees)?;
    }
    if req.agenda.is_some() {
        record.agenda = optional_text(req.agenda);
    }
    if let Some(content) = req.content {
        record.content = required_content(&content)?;
    }
    if req.decisions.is_some() {
        record.decisions = optional_text(req.decisions);
    }

    let updated_at = now();
    minutes::update(&state.db, &record, updated_at).await?;
    record.updated_at = updated_at;

    Ok(Json(record))
}

/// DELETE /api/minutes/:id (manage)
pub async fn delete_minutes(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    let (record, ctx) = load_minutes(&state, id).await?;
    ctx.require_manage(&auth)?;

    minutes::delete(&state.db, record.id).await?;
    info!(community_id = %record.community_id, minutes_id = %id, by = %auth.id(), "Minutes deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Build meeting minutes routes
pub fn minutes_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/communities/:id/minutes",
            get(list_minutes).post(create_minutes),
        )
        .route(
            "/api/minutes/:id",
            get(get_minutes).patch(update_minutes).delete(delete_minutes),
        )
}
