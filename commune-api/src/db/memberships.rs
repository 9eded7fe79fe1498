//! Community membership database operations
//!
//! Primary-community invariant: a member with at least one ACTIVE membership
//! has exactly one primary membership, and it is ACTIVE. Every write that can
//! break this runs [`ensure_primary`] inside the same transaction.

use super::{opt_uuid_col, roles, uuid_col};
use chrono::{DateTime, Utc};
use commune_common::db::{parse_stored, Membership, MembershipStatus, Role};
use commune_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

const MEMBERSHIP_COLUMNS: &str = "id, member_id, community_id, status, is_primary, joined_at, updated_at";

/// Row of a community's member list
#[derive(Debug, Clone, Serialize)]
pub struct CommunityMemberEntry {
    pub member_id: Uuid,
    pub name: Option<String>,
    /// Only shown to community managers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub status: MembershipStatus,
    pub is_primary: bool,
    pub joined_at: DateTime<Utc>,
    pub roles: Vec<Role>,
}

/// One of the caller's memberships with its community
#[derive(Debug, Clone, Serialize)]
pub struct MemberCommunityEntry {
    pub community_id: Uuid,
    pub community_name: String,
    pub organization_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub status: MembershipStatus,
    pub is_primary: bool,
    pub joined_at: DateTime<Utc>,
}

fn membership_from_row(row: &SqliteRow) -> Result<Membership> {
    let status: String = row.try_get("status")?;
    Ok(Membership {
        id: uuid_col(row, "id")?,
        member_id: uuid_col(row, "member_id")?,
        community_id: uuid_col(row, "community_id")?,
        status: parse_stored(&status)?,
        is_primary: row.try_get("is_primary")?,
        joined_at: row.try_get("joined_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn find(pool: &SqlitePool, member_id: Uuid, community_id: Uuid) -> Result<Option<Membership>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM community_memberships WHERE member_id = ? AND community_id = ?",
        MEMBERSHIP_COLUMNS
    ))
    .bind(member_id.to_string())
    .bind(community_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(membership_from_row).transpose()
}

pub async fn status_of(
    pool: &SqlitePool,
    member_id: Uuid,
    community_id: Uuid,
) -> Result<Option<MembershipStatus>> {
    Ok(find(pool, member_id, community_id).await?.map(|m| m.status))
}

/// Insert a new non-primary membership
pub async fn insert(
    conn: &mut SqliteConnection,
    member_id: Uuid,
    community_id: Uuid,
    status: MembershipStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO community_memberships ({}) VALUES (?, ?, ?, ?, 0, ?, ?)",
        MEMBERSHIP_COLUMNS
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(member_id.to_string())
    .bind(community_id.to_string())
    .bind(status.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Restore the primary-community invariant for one member
///
/// Drops a primary flag sitting on a non-ACTIVE membership, then promotes
/// the earliest-joined ACTIVE membership when no primary remains.
pub async fn ensure_primary(conn: &mut SqliteConnection, member_id: Uuid, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE community_memberships SET is_primary = 0, updated_at = ?
        WHERE member_id = ? AND is_primary = 1 AND status != 'ACTIVE'
        "#,
    )
    .bind(now)
    .bind(member_id.to_string())
    .execute(&mut *conn)
    .await?;

    let has_primary: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM community_memberships WHERE member_id = ? AND is_primary = 1",
    )
    .bind(member_id.to_string())
    .fetch_one(&mut *conn)
    .await?;

    if has_primary == 0 {
        sqlx::query(
            r#"
            UPDATE community_memberships SET is_primary = 1, updated_at = ?
            WHERE id = (
                SELECT id FROM community_memberships
                WHERE member_id = ? AND status = 'ACTIVE'
                ORDER BY joined_at, id
                LIMIT 1
            )
            "#,
        )
        .bind(now)
        .bind(member_id.to_string())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Create a membership, or reopen an INACTIVE one, with `status`
pub async fn join(
    pool: &SqlitePool,
    member_id: Uuid,
    community_id: Uuid,
    status: MembershipStatus,
    now: DateTime<Utc>,
) -> Result<Membership> {
    let mut tx = pool.begin().await?;

    let reopened = sqlx::query(
        r#"
        UPDATE community_memberships SET status = ?, joined_at = ?, updated_at = ?
        WHERE member_id = ? AND community_id = ? AND status = 'INACTIVE'
        "#,
    )
    .bind(status.as_str())
    .bind(now)
    .bind(now)
    .bind(member_id.to_string())
    .bind(community_id.to_string())
    .execute(&mut *tx)
    .await?;

    if reopened.rows_affected() == 0 {
        insert(&mut tx, member_id, community_id, status, now).await?;
    }
    ensure_primary(&mut tx, member_id, now).await?;

    tx.commit().await?;

    find(pool, member_id, community_id)
        .await?
        .ok_or_else(|| Error::Internal("Membership missing after join".to_string()))
}

/// Change a membership status, keeping the primary invariant
///
/// Moving the community's last ACTIVE admin away from ACTIVE is a `Conflict`.
pub async fn set_status(
    pool: &SqlitePool,
    member_id: Uuid,
    community_id: Uuid,
    status: MembershipStatus,
    now: DateTime<Utc>,
) -> Result<Membership> {
    let mut tx = pool.begin().await?;

    if status != MembershipStatus::Active {
        roles::guard_last_active_admin(
            &mut tx,
            member_id,
            community_id,
            "Cannot deactivate the last admin of a community",
        )
        .await?;
    }

    let updated = sqlx::query(
        "UPDATE community_memberships SET status = ?, updated_at = ? WHERE member_id = ? AND community_id = ?",
    )
    .bind(status.as_str())
    .bind(now)
    .bind(member_id.to_string())
    .bind(community_id.to_string())
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(Error::NotFound("Membership not found".to_string()));
    }
    ensure_primary(&mut tx, member_id, now).await?;

    tx.commit().await?;

    find(pool, member_id, community_id)
        .await?
        .ok_or_else(|| Error::Internal("Membership missing after update".to_string()))
}

/// Delete a membership together with the member's roles in that community
///
/// The last ACTIVE admin may only leave once nobody else belongs to the
/// community.
pub async fn remove(pool: &SqlitePool, member_id: Uuid, community_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let others: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM community_memberships WHERE community_id = ? AND member_id != ?",
    )
    .bind(community_id.to_string())
    .bind(member_id.to_string())
    .fetch_one(&mut *tx)
    .await?;
    if others > 0 {
        roles::guard_last_active_admin(
            &mut tx,
            member_id,
            community_id,
            "Cannot remove the last admin while the community has other members",
        )
        .await?;
    }

    let deleted = sqlx::query(
        "DELETE FROM community_memberships WHERE member_id = ? AND community_id = ?",
    )
    .bind(member_id.to_string())
    .bind(community_id.to_string())
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM role_assignments WHERE member_id = ? AND community_id = ?")
        .bind(member_id.to_string())
        .bind(community_id.to_string())
        .execute(&mut *tx)
        .await?;

    ensure_primary(&mut tx, member_id, now).await?;

    tx.commit().await?;

    Ok(deleted.rows_affected() > 0)
}

/// Make `community_id` the member's primary community
///
/// The membership must be ACTIVE. Clearing the old flag and setting the new
/// one happen in one transaction.
pub async fn set_primary(pool: &SqlitePool, member_id: Uuid, community_id: Uuid, now: DateTime<Utc>) -> Result<()> {
    let mut tx = pool.begin().await?;

    let status: Option<String> = sqlx::query_scalar(
        "SELECT status FROM community_memberships WHERE member_id = ? AND community_id = ?",
    )
    .bind(member_id.to_string())
    .bind(community_id.to_string())
    .fetch_optional(&mut *tx)
    .await?;

    match status.as_deref().map(parse_stored::<MembershipStatus>).transpose()? {
        None => return Err(Error::NotFound("Membership not found".to_string())),
        Some(MembershipStatus::Active) => {}
        Some(other) => {
            return Err(Error::InvalidInput(format!(
                "Only an ACTIVE membership can be primary (membership is {})",
                other
            )))
        }
    }

    sqlx::query(
        "UPDATE community_memberships SET is_primary = 0, updated_at = ? WHERE member_id = ? AND is_primary = 1",
    )
    .bind(now)
    .bind(member_id.to_string())
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE community_memberships SET is_primary = 1, updated_at = ? WHERE member_id = ? AND community_id = ?",
    )
    .bind(now)
    .bind(member_id.to_string())
    .bind(community_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn count_for_community(
    pool: &SqlitePool,
    community_id: Uuid,
    status: Option<MembershipStatus>,
) -> Result<i64> {
    let status = status.map(|s| s.as_str());
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM community_memberships WHERE community_id = ? AND (? IS NULL OR status = ?)",
    )
    .bind(community_id.to_string())
    .bind(status)
    .bind(status)
    .fetch_one(pool)
    .await?;
    Ok(total)
}

/// Members of a community in join order, with their roles there
pub async fn list_for_community(
    pool: &SqlitePool,
    community_id: Uuid,
    status: Option<MembershipStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<CommunityMemberEntry>> {
    let status = status.map(|s| s.as_str());
    let rows = sqlx::query(
        r#"
        SELECT cm.member_id, m.name, m.email, cm.status, cm.is_primary, cm.joined_at,
               (SELECT GROUP_CONCAT(r.role) FROM role_assignments r
                 WHERE r.member_id = cm.member_id AND r.community_id = cm.community_id) AS roles
        FROM community_memberships cm
        JOIN members m ON m.id = cm.member_id
        WHERE cm.community_id = ? AND (? IS NULL OR cm.status = ?)
        ORDER BY cm.joined_at, cm.id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(community_id.to_string())
    .bind(status)
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let status: String = row.try_get("status")?;
            let roles: Option<String> = row.try_get("roles")?;
            let roles = roles
                .as_deref()
                .unwrap_or("")
                .split(',')
                .filter(|s| !s.is_empty())
                .map(parse_stored::<Role>)
                .collect::<Result<Vec<_>>>()?;

            Ok(CommunityMemberEntry {
                member_id: uuid_col(row, "member_id")?,
                name: row.try_get("name")?,
                email: row.try_get("email")?,
                status: parse_stored(&status)?,
                is_primary: row.try_get("is_primary")?,
                joined_at: row.try_get("joined_at")?,
                roles,
            })
        })
        .collect()
}

/// All memberships of one member, primary first
pub async fn list_for_member(pool: &SqlitePool, member_id: Uuid) -> Result<Vec<MemberCommunityEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT cm.community_id, c.name AS community_name, c.organization_id, c.parent_id,
               cm.status, cm.is_primary, cm.joined_at
        FROM community_memberships cm
        JOIN communities c ON c.id = cm.community_id
        WHERE cm.member_id = ?
        ORDER BY cm.is_primary DESC, c.name COLLATE NOCASE
        "#,
    )
    .bind(member_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let status: String = row.try_get("status")?;
            Ok(MemberCommunityEntry {
                community_id: uuid_col(row, "community_id")?,
                community_name: row.try_get("community_name")?,
                organization_id: uuid_col(row, "organization_id")?,
                parent_id: opt_uuid_col(row, "parent_id")?,
                status: parse_stored(&status)?,
                is_primary: row.try_get("is_primary")?,
                joined_at: row.try_get("joined_at")?,
            })
        })
        .collect()
}
