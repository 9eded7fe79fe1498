//! Magic link token persistence
//!
//! Rows are keyed by the token's SHA-256 digest; raw tokens never reach the
//! database.

use super::uuid_col;
use chrono::{DateTime, Duration, Utc};
use commune_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Used tokens are kept this long before purging
const USED_RETENTION_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct StoredMagicLink {
    pub id: Uuid,
    pub member_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

pub async fn insert(
    pool: &SqlitePool,
    member_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO magic_link_tokens (id, member_id, token_hash, expires_at, used_at, created_at)
        VALUES (?, ?, ?, ?, NULL, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(member_id.to_string())
    .bind(token_hash)
    .bind(expires_at)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn find_by_hash(pool: &SqlitePool, token_hash: &str) -> Result<Option<StoredMagicLink>> {
    let row = sqlx::query(
        "SELECT id, member_id, expires_at, used_at FROM magic_link_tokens WHERE token_hash = ?",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(StoredMagicLink {
            id: uuid_col(&row, "id")?,
            member_id: uuid_col(&row, "member_id")?,
            expires_at: row.try_get("expires_at")?,
            used_at: row.try_get("used_at")?,
        })),
        None => Ok(None),
    }
}

/// Mark a token used; false when another request consumed it first
pub async fn consume(pool: &SqlitePool, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE magic_link_tokens SET used_at = ? WHERE id = ? AND used_at IS NULL",
    )
    .bind(now)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Delete expired tokens and tokens used more than a day ago
pub async fn purge(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let used_cutoff = now - Duration::hours(USED_RETENTION_HOURS);
    let result = sqlx::query(
        "DELETE FROM magic_link_tokens WHERE expires_at < ? OR (used_at IS NOT NULL AND used_at < ?)",
    )
    .bind(now)
    .bind(used_cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
