//! Organization database operations

use super::{search_term, uuid_col};
use chrono::{DateTime, Utc};
use commune_common::db::Organization;
use commune_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

fn organization_from_row(row: &SqliteRow) -> Result<Organization> {
    Ok(Organization {
        id: uuid_col(row, "id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn create(
    pool: &SqlitePool,
    name: &str,
    description: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Organization> {
    let organization = Organization {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: description.map(str::to_string),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO organizations (id, name, description, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(organization.id.to_string())
    .bind(&organization.name)
    .bind(&organization.description)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(organization)
}

pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Organization>> {
    let row = sqlx::query(
        "SELECT id, name, description, created_at, updated_at FROM organizations WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(organization_from_row).transpose()
}

pub async fn name_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM organizations WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

pub async fn count(pool: &SqlitePool, q: Option<&str>) -> Result<i64> {
    let pattern = search_term(q);
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM organizations WHERE (? IS NULL OR name LIKE ? ESCAPE '\\')",
    )
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(pool)
    .await?;
    Ok(total)
}

/// Organizations ordered by name
pub async fn list(
    pool: &SqlitePool,
    q: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Organization>> {
    let pattern = search_term(q);
    let rows = sqlx::query(
        r#"
        SELECT id, name, description, created_at, updated_at
        FROM organizations
        WHERE (? IS NULL OR name LIKE ? ESCAPE '\')
        ORDER BY name COLLATE NOCASE
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(organization_from_row).collect()
}
