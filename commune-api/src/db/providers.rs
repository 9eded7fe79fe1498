//! Marketplace service provider database operations

use super::{search_term, uuid_col};
use chrono::{DateTime, Utc};
use commune_common::db::{parse_stored, ServiceCategory, ServiceProvider};
use commune_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const PROVIDER_COLUMNS: &str = "id, owner_id, name, category, description, location, \
     price_min_cents, price_max_cents, contact_email, contact_phone, website, created_at, updated_at";

/// Listing filters; `None` fields do not restrict
#[derive(Debug, Default, Clone)]
pub struct ProviderFilter {
    pub category: Option<ServiceCategory>,
    /// Matches name or description
    pub q: Option<String>,
    pub location: Option<String>,
}

const FILTER_CLAUSE: &str = r#"
    WHERE (? IS NULL OR category = ?)
      AND (? IS NULL OR name LIKE ? ESCAPE '\' OR description LIKE ? ESCAPE '\')
      AND (? IS NULL OR location LIKE ? ESCAPE '\')
"#;

fn provider_from_row(row: &SqliteRow) -> Result<ServiceProvider> {
    let category: String = row.try_get("category")?;
    Ok(ServiceProvider {
        id: uuid_col(row, "id")?,
        owner_id: uuid_col(row, "owner_id")?,
        name: row.try_get("name")?,
        category: parse_stored(&category)?,
        description: row.try_get("description")?,
        location: row.try_get("location")?,
        price_min_cents: row.try_get("price_min_cents")?,
        price_max_cents: row.try_get("price_max_cents")?,
        contact_email: row.try_get("contact_email")?,
        contact_phone: row.try_get("contact_phone")?,
        website: row.try_get("website")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn create(pool: &SqlitePool, provider: &ServiceProvider) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO service_providers ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        PROVIDER_COLUMNS
    ))
    .bind(provider.id.to_string())
    .bind(provider.owner_id.to_string())
    .bind(&provider.name)
    .bind(provider.category.as_str())
    .bind(&provider.description)
    .bind(&provider.location)
    .bind(provider.price_min_cents)
    .bind(provider.price_max_cents)
    .bind(&provider.contact_email)
    .bind(&provider.contact_phone)
    .bind(&provider.website)
    .bind(provider.created_at)
    .bind(provider.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<ServiceProvider>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM service_providers WHERE id = ?",
        PROVIDER_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(provider_from_row).transpose()
}

pub async fn count(pool: &SqlitePool, filter: &ProviderFilter) -> Result<i64> {
    let category = filter.category.map(|c| c.as_str());
    let q = search_term(filter.q.as_deref());
    let location = search_term(filter.location.as_deref());

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM service_providers {}",
        FILTER_CLAUSE
    ))
    .bind(category)
    .bind(category)
    .bind(&q)
    .bind(&q)
    .bind(&q)
    .bind(&location)
    .bind(&location)
    .fetch_one(pool)
    .await?;
    Ok(total)
}

/// Providers ordered by name
pub async fn list(
    pool: &SqlitePool,
    filter: &ProviderFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<ServiceProvider>> {
    let category = filter.category.map(|c| c.as_str());
    let q = search_term(filter.q.as_deref());
    let location = search_term(filter.location.as_deref());

    let rows = sqlx::query(&format!(
        "SELECT {} FROM service_providers {} ORDER BY name COLLATE NOCASE, id LIMIT ? OFFSET ?",
        PROVIDER_COLUMNS, FILTER_CLAUSE
    ))
    .bind(category)
    .bind(category)
    .bind(&q)
    .bind(&q)
    .bind(&q)
    .bind(&location)
    .bind(&location)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(provider_from_row).collect()
}

pub async fn update(pool: &SqlitePool, provider: &ServiceProvider, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE service_providers
        SET name = ?, category = ?, description = ?, location = ?, price_min_cents = ?,
            price_max_cents = ?, contact_email = ?, contact_phone = ?, website = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&provider.name)
    .bind(provider.category.as_str())
    .bind(&provider.description)
    .bind(&provider.location)
    .bind(provider.price_min_cents)
    .bind(provider.price_max_cents)
    .bind(&provider.contact_email)
    .bind(&provider.contact_phone)
    .bind(&provider.website)
    .bind(now)
    .bind(provider.id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM service_providers WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
