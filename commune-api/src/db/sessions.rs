//! Session persistence
//!
//! Session tokens are self-validating (signed), but each one also has a row
//! here so it can be revoked before it expires.

use super::uuid_col;
use chrono::{DateTime, Utc};
use commune_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}

pub async fn create(
    pool: &SqlitePool,
    id: Uuid,
    member_id: Uuid,
    user_agent: Option<&str>,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, member_id, user_agent, created_at, expires_at, revoked_at)
        VALUES (?, ?, ?, ?, ?, NULL)
        "#,
    )
    .bind(id.to_string())
    .bind(member_id.to_string())
    .bind(user_agent)
    .bind(now)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find(pool: &SqlitePool, id: Uuid) -> Result<Option<SessionRecord>> {
    let row = sqlx::query(
        "SELECT id, member_id, user_agent, created_at, expires_at, revoked_at FROM sessions WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(SessionRecord {
            id: uuid_col(&row, "id")?,
            member_id: uuid_col(&row, "member_id")?,
            user_agent: row.try_get("user_agent")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            revoked_at: row.try_get("revoked_at")?,
        })),
        None => Ok(None),
    }
}

/// Revoke a session; false when it was already revoked or unknown
pub async fn revoke(pool: &SqlitePool, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query("UPDATE sessions SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL")
        .bind(now)
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Delete expired and revoked sessions
pub async fn purge(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ? OR revoked_at IS NOT NULL")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
