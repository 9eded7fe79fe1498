//! Role assignment database operations
//!
//! Revocations that could leave a community (or the platform) without an
//! admin check the remaining count and delete in the same transaction.

use super::{opt_uuid_col, uuid_col};
use chrono::{DateTime, Utc};
use commune_common::db::{parse_stored, parse_uuid, Role, RoleAssignment};
use commune_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

fn assignment_from_row(row: &SqliteRow) -> Result<RoleAssignment> {
    let role: String = row.try_get("role")?;
    Ok(RoleAssignment {
        id: uuid_col(row, "id")?,
        member_id: uuid_col(row, "member_id")?,
        community_id: opt_uuid_col(row, "community_id")?,
        role: parse_stored(&role)?,
        granted_by: opt_uuid_col(row, "granted_by")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Every role assignment held by a member
pub async fn for_member(pool: &SqlitePool, member_id: Uuid) -> Result<Vec<RoleAssignment>> {
    let rows = sqlx::query(
        r#"
        SELECT id, member_id, community_id, role, granted_by, created_at
        FROM role_assignments
        WHERE member_id = ?
        ORDER BY created_at
        "#,
    )
    .bind(member_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(assignment_from_row).collect()
}

async fn insert(
    pool: &SqlitePool,
    member_id: Uuid,
    community_id: Option<Uuid>,
    role: Role,
    granted_by: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<RoleAssignment> {
    let assignment = RoleAssignment {
        id: Uuid::new_v4(),
        member_id,
        community_id,
        role,
        granted_by,
        created_at: now,
    };

    let result = sqlx::query(
        r#"
        INSERT INTO role_assignments (id, member_id, community_id, role, granted_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(assignment.id.to_string())
    .bind(member_id.to_string())
    .bind(community_id.map(|id| id.to_string()))
    .bind(role.as_str())
    .bind(granted_by.map(|id| id.to_string()))
    .bind(now)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(assignment),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(Error::Conflict(format!(
            "Member already holds {}",
            role
        ))),
        Err(e) => Err(e.into()),
    }
}

pub async fn grant_community_admin(
    pool: &SqlitePool,
    member_id: Uuid,
    community_id: Uuid,
    granted_by: Uuid,
    now: DateTime<Utc>,
) -> Result<RoleAssignment> {
    insert(pool, member_id, Some(community_id), Role::CommunityAdmin, Some(granted_by), now).await
}

pub async fn grant_super_admin(
    pool: &SqlitePool,
    member_id: Uuid,
    granted_by: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<RoleAssignment> {
    insert(pool, member_id, None, Role::SuperAdmin, granted_by, now).await
}

/// Grant SUPER_ADMIN unless already held; returns true when newly granted
pub async fn ensure_super_admin(pool: &SqlitePool, member_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO role_assignments (id, member_id, community_id, role, granted_by, created_at)
        VALUES (?, ?, NULL, 'SUPER_ADMIN', NULL, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(member_id.to_string())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Role assignments that currently confer permissions
///
/// SUPER_ADMIN always counts. COMMUNITY_ADMIN counts only while the holder's
/// membership in that community is ACTIVE.
pub async fn effective_for_member(pool: &SqlitePool, member_id: Uuid) -> Result<Vec<RoleAssignment>> {
    let rows = sqlx::query(
        r#"
        SELECT r.id, r.member_id, r.community_id, r.role, r.granted_by, r.created_at
        FROM role_assignments r
        WHERE r.member_id = ?
          AND (
            r.role = 'SUPER_ADMIN'
            OR EXISTS (
                SELECT 1 FROM community_memberships m
                WHERE m.member_id = r.member_id
                  AND m.community_id = r.community_id
                  AND m.status = 'ACTIVE'
            )
          )
        ORDER BY r.created_at
        "#,
    )
    .bind(member_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(assignment_from_row).collect()
}

/// Members holding COMMUNITY_ADMIN on `community_id` with an ACTIVE membership there
pub async fn active_admin_ids(conn: &mut SqliteConnection, community_id: Uuid) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT r.member_id FROM role_assignments r
        JOIN community_memberships m
          ON m.member_id = r.member_id AND m.community_id = r.community_id
        WHERE r.community_id = ? AND r.role = 'COMMUNITY_ADMIN' AND m.status = 'ACTIVE'
        "#,
    )
    .bind(community_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    ids.iter().map(|id| parse_uuid(id)).collect()
}

/// Fails with `Conflict` when `member_id` is the only ACTIVE admin of the community
pub async fn guard_last_active_admin(
    conn: &mut SqliteConnection,
    member_id: Uuid,
    community_id: Uuid,
    message: &str,
) -> Result<()> {
    let admins = active_admin_ids(conn, community_id).await?;
    if admins.len() == 1 && admins[0] == member_id {
        return Err(Error::Conflict(message.to_string()));
    }
    Ok(())
}

/// Revoke COMMUNITY_ADMIN; refuses to remove the community's last ACTIVE admin
pub async fn revoke_community_admin(pool: &SqlitePool, member_id: Uuid, community_id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;

    guard_last_active_admin(
        &mut tx,
        member_id,
        community_id,
        "Cannot remove the last admin of a community",
    )
    .await?;

    let deleted = sqlx::query(
        "DELETE FROM role_assignments WHERE member_id = ? AND community_id = ? AND role = 'COMMUNITY_ADMIN'",
    )
    .bind(member_id.to_string())
    .bind(community_id.to_string())
    .execute(&mut *tx)
    .await?;

    if deleted.rows_affected() == 0 {
        return Err(Error::NotFound("Member is not an admin of this community".to_string()));
    }

    tx.commit().await?;
    Ok(())
}

/// Revoke SUPER_ADMIN; refuses to remove the last one
pub async fn revoke_super_admin(pool: &SqlitePool, member_id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;

    let holders: Vec<String> = sqlx::query_scalar(
        "SELECT member_id FROM role_assignments WHERE community_id IS NULL AND role = 'SUPER_ADMIN'",
    )
    .fetch_all(&mut *tx)
    .await?;

    let member = member_id.to_string();
    if !holders.contains(&member) {
        return Err(Error::NotFound("Member is not a super admin".to_string()));
    }
    if holders.len() == 1 {
        return Err(Error::Conflict("Cannot remove the last super admin".to_string()));
    }

    sqlx::query("DELETE FROM role_assignments WHERE member_id = ? AND community_id IS NULL AND role = 'SUPER_ADMIN'")
        .bind(&member)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
