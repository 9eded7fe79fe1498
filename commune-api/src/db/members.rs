//! Member database operations

use super::uuid_col;
use chrono::{DateTime, Utc};
use commune_common::db::Member;
use commune_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const MEMBER_COLUMNS: &str =
    "id, email, name, phone, bio, email_verified, last_login_at, created_at, updated_at";

/// Name-only view of a member, safe to show publicly
#[derive(Debug, Clone, Serialize)]
pub struct MemberSummary {
    pub id: Uuid,
    pub name: Option<String>,
}

fn member_from_row(row: &SqliteRow) -> Result<Member> {
    Ok(Member {
        id: uuid_col(row, "id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        bio: row.try_get("bio")?,
        email_verified: row.try_get("email_verified")?,
        last_login_at: row.try_get("last_login_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Member>> {
    let row = sqlx::query(&format!("SELECT {} FROM members WHERE id = ?", MEMBER_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(member_from_row).transpose()
}

/// `email` must already be normalized
pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Member>> {
    let row = sqlx::query(&format!("SELECT {} FROM members WHERE email = ?", MEMBER_COLUMNS))
        .bind(email)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(member_from_row).transpose()
}

/// Load the member with `email`, creating an unverified one if unknown
///
/// Returns the member and whether it was created by this call.
pub async fn find_or_create_by_email(
    pool: &SqlitePool,
    email: &str,
    name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(Member, bool)> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO members (id, email, name, email_verified, created_at, updated_at)
        VALUES (?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(email)
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let created = result.rows_affected() == 1;
    let member = find_by_email(pool, email)
        .await?
        .ok_or_else(|| commune_common::Error::Internal(format!("Member vanished: {}", email)))?;

    Ok((member, created))
}

/// Record a successful sign-in
pub async fn mark_signed_in(pool: &SqlitePool, id: Uuid, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE members SET email_verified = 1, last_login_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(now)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite the editable profile fields
pub async fn update_profile(pool: &SqlitePool, member: &Member, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE members SET name = ?, phone = ?, bio = ?, updated_at = ? WHERE id = ?")
        .bind(&member.name)
        .bind(&member.phone)
        .bind(&member.bio)
        .bind(now)
        .bind(member.id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;

    #[tokio::test]
    async fn test_find_or_create_is_idempotent() {
        let (pool, _dir) = test_pool().await;
        let now = Utc::now();

        let (first, created) = find_or_create_by_email(&pool, "ada@example.org", Some("Ada"), now)
            .await
            .unwrap();
        assert!(created);
        assert!(!first.email_verified);
        assert_eq!(first.name.as_deref(), Some("Ada"));

        let (second, created) = find_or_create_by_email(&pool, "ada@example.org", None, now)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_mark_signed_in_verifies_email() {
        let (pool, _dir) = test_pool().await;
        let now = Utc::now();
        let (member, _) = find_or_create_by_email(&pool, "bo@example.org", None, now)
            .await
            .unwrap();

        mark_signed_in(&pool, member.id, now).await.unwrap();

        let reloaded = find_by_id(&pool, member.id).await.unwrap().unwrap();
        assert!(reloaded.email_verified);
        assert!(reloaded.last_login_at.is_some());
    }
}
