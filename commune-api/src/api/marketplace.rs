//! Marketplace of event-service providers

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use commune_common::auth::normalize_email;
use commune_common::db::{ServiceCategory, ServiceProvider};
use commune_common::time::now;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{optional_text, parse_filter, required_text};
use crate::db::providers::{self, ProviderFilter};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthMember};
use crate::pagination::{calculate_pagination, Page};
use crate::AppState;

const MAX_NAME_CHARS: usize = 120;
const MAX_PHONE_CHARS: usize = 40;
const MAX_WEBSITE_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
pub struct ProviderQuery {
    pub category: Option<String>,
    pub q: Option<String>,
    pub location: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProvider {
    pub name: String,
    pub category: ServiceCategory,
    pub description: Option<String>,
    pub location: Option<String>,
    pub price_min_cents: Option<i64>,
    pub price_max_cents: Option<i64>,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub website: Option<String>,
}

/// Absent fields are left unchanged; empty strings clear optional text
#[derive(Debug, Deserialize)]
pub struct UpdateProvider {
    pub name: Option<String>,
    pub category: Option<ServiceCategory>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub price_min_cents: Option<i64>,
    pub price_max_cents: Option<i64>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub website: Option<String>,
}

fn check_price_range(min: Option<i64>, max: Option<i64>) -> ApiResult<()> {
    if min.is_some_and(|v| v < 0) || max.is_some_and(|v| v < 0) {
        return Err(ApiError::BadRequest("Prices cannot be negative".to_string()));
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(ApiError::BadRequest(
                "price_min_cents cannot exceed price_max_cents".to_string(),
            ));
        }
    }
    Ok(())
}

fn check_phone(phone: Option<String>) -> ApiResult<Option<String>> {
    let phone = optional_text(phone);
    if phone.as_ref().is_some_and(|p| p.chars().count() > MAX_PHONE_CHARS) {
        return Err(ApiError::BadRequest(format!(
            "contact_phone must be at most {} characters",
            MAX_PHONE_CHARS
        )));
    }
    Ok(phone)
}

fn check_website(website: Option<String>) -> ApiResult<Option<String>> {
    let website = optional_text(website);
    if let Some(url) = &website {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ApiError::BadRequest(
                "website must be an http(s) URL".to_string(),
            ));
        }
        if url.len() > MAX_WEBSITE_CHARS {
            return Err(ApiError::BadRequest("website is too long".to_string()));
        }
    }
    Ok(website)
}

async fn load_provider(state: &AppState, id: Uuid) -> ApiResult<ServiceProvider> {
    providers::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Provider {}", id)))
}

/// GET /api/marketplace/providers
pub async fn list_providers(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProviderQuery>,
) -> ApiResult<Json<Page<ServiceProvider>>> {
    let filter = ProviderFilter {
        category: parse_filter(query.category.as_deref())?,
        q: query.q,
        location: query.location,
    };

    let total = providers::count(&state.db, &filter).await?;
    let pagination = calculate_pagination(total, query.page, query.page_size);
    let items = providers::list(&state.db, &filter, pagination.page_size, pagination.offset).await?;

    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /api/marketplace/providers/:id
pub async fn get_provider(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ServiceProvider>> {
    Ok(Json(load_provider(&state, id).await?))
}

/// POST /api/marketplace/providers
pub async fn create_provider(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiJson(req): ApiJson<CreateProvider>,
) -> ApiResult<(StatusCode, Json<ServiceProvider>)> {
    check_price_range(req.price_min_cents, req.price_max_cents)?;

    let created_at = now();
    let provider = ServiceProvider {
        id: Uuid::new_v4(),
        owner_id: auth.id(),
        name: required_text("name", &req.name, MAX_NAME_CHARS)?,
        category: req.category,
        description: optional_text(req.description),
        location: optional_text(req.location),
        price_min_cents: req.price_min_cents,
        price_max_cents: req.price_max_cents,
        contact_email: normalize_email(&req.contact_email)?,
        contact_phone: check_phone(req.contact_phone)?,
        website: check_website(req.website)?,
        created_at,
        updated_at: created_at,
    };

    providers::create(&state.db, &provider).await?;
    info!(provider_id = %provider.id, category = %provider.category, owner = %auth.id(), "Provider listed");

    Ok((StatusCode::CREATED, Json(provider)))
}

/// PATCH /api/marketplace/providers/:id (owner or SUPER_ADMIN)
pub async fn update_provider(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateProvider>,
) -> ApiResult<Json<ServiceProvider>> {
    let mut provider = load_provider(&state, id).await?;
    auth.access.require_owner_or_super_admin(provider.owner_id)?;

    if let Some(name) = req.name {
        provider.name = required_text("name", &name, MAX_NAME_CHARS)?;
    }
    if let Some(category) = req.category {
        provider.category = category;
    }
    if req.description.is_some() {
        provider.description = optional_text(req.description);
    }
    if req.location.is_some() {
        provider.location = optional_text(req.location);
    }
    if req.price_min_cents.is_some() {
        provider.price_min_cents = req.price_min_cents;
    }
    if req.price_max_cents.is_some() {
        provider.price_max_cents = req.price_max_cents;
    }
    check_price_range(provider.price_min_cents, provider.price_max_cents)?;
    if let Some(email) = req.contact_email {
        provider.contact_email = normalize_email(&email)?;
    }
    if req.contact_phone.is_some() {
        provider.contact_phone = check_phone(req.contact_phone)?;
    }
    if req.website.is_some() {
        provider.website = check_website(req.website)?;
    }

    let updated_at = now();
    providers::update(&state.db, &provider, updated_at).await?;
    provider.updated_at = updated_at;

    Ok(Json(provider))
}

/// DELETE /api/marketplace/providers/:id (owner or SUPER_ADMIN)
pub async fn delete_provider(
    State(state): State<AppState>,
    auth: AuthMember,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    let provider = load_provider(&state, id).await?;
    auth.access.require_owner_or_super_admin(provider.owner_id)?;

    providers::delete(&state.db, id).await?;
    info!(provider_id = %id, by = %auth.id(), "Provider removed");

    Ok(StatusCode::NO_CONTENT)
}

/// Build marketplace routes
pub fn marketplace_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/marketplace/providers",
            get(list_providers).post(create_provider),
        )
        .route(
            "/api/marketplace/providers/:id",
            get(get_provider)
                .patch(update_provider)
                .delete(delete_provider),
        )
}
