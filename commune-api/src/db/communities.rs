//! Community database operations
//!
//! Communities form a tree through `parent_id`. Authorization walks the tree
//! upwards with [`lineage`]; cycle checks use the same walk.

use super::members::MemberSummary;
use super::{memberships, opt_uuid_col, search_term, uuid_col};
use chrono::{DateTime, Utc};
use commune_common::db::{Community, MembershipStatus, Role};
use commune_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Longest parent chain followed before giving up
const MAX_DEPTH: i64 = 64;

const COMMUNITY_COLUMNS: &str = "id, organization_id, parent_id, name, description, location, \
     requires_approval, currency, created_by, created_at, updated_at";

const SUMMARY_SELECT: &str = r#"
    SELECT c.id, c.organization_id, c.parent_id, c.name, c.description, c.location,
           c.requires_approval, c.currency,
           (SELECT COUNT(*) FROM community_memberships m
             WHERE m.community_id = c.id AND m.status = 'ACTIVE') AS member_count
    FROM communities c
"#;

/// Community with its ACTIVE member count, used in lists
#[derive(Debug, Clone, Serialize)]
pub struct CommunitySummary {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub requires_approval: bool,
    pub currency: String,
    pub member_count: i64,
}

/// List filters; `None` fields do not restrict
#[derive(Debug, Default, Clone)]
pub struct CommunityFilter {
    pub q: Option<String>,
    pub organization_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub top_level_only: bool,
}

/// Fields of a community about to be created
#[derive(Debug, Clone)]
pub struct NewCommunity {
    pub organization_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub requires_approval: bool,
    pub currency: String,
}

fn community_from_row(row: &SqliteRow) -> Result<Community> {
    Ok(Community {
        id: uuid_col(row, "id")?,
        organization_id: uuid_col(row, "organization_id")?,
        parent_id: opt_uuid_col(row, "parent_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        location: row.try_get("location")?,
        requires_approval: row.try_get("requires_approval")?,
        currency: row.try_get("currency")?,
        created_by: opt_uuid_col(row, "created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn summary_from_row(row: &SqliteRow) -> Result<CommunitySummary> {
    Ok(CommunitySummary {
        id: uuid_col(row, "id")?,
        organization_id: uuid_col(row, "organization_id")?,
        parent_id: opt_uuid_col(row, "parent_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        location: row.try_get("location")?,
        requires_approval: row.try_get("requires_approval")?,
        currency: row.try_get("currency")?,
        member_count: row.try_get("member_count")?,
    })
}

pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Community>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM communities WHERE id = ?",
        COMMUNITY_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(community_from_row).transpose()
}

pub async fn find_summary(pool: &SqlitePool, id: Uuid) -> Result<Option<CommunitySummary>> {
    let row = sqlx::query(&format!("{} WHERE c.id = ?", SUMMARY_SELECT))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(summary_from_row).transpose()
}

const FILTER_CLAUSE: &str = r#"
    WHERE (? IS NULL OR c.name LIKE ? ESCAPE '\'
                     OR c.description LIKE ? ESCAPE '\'
                     OR c.location LIKE ? ESCAPE '\')
      AND (? IS NULL OR c.organization_id = ?)
      AND (? IS NULL OR c.parent_id = ?)
      AND (? = 0 OR c.parent_id IS NULL)
"#;

pub async fn count(pool: &SqlitePool, filter: &CommunityFilter) -> Result<i64> {
    let pattern = search_term(filter.q.as_deref());
    let organization_id = filter.organization_id.map(|id| id.to_string());
    let parent_id = filter.parent_id.map(|id| id.to_string());

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM communities c {}", FILTER_CLAUSE))
            .bind(&pattern)
            .bind(&pattern)
            .bind(&pattern)
            .bind(&pattern)
            .bind(&organization_id)
            .bind(&organization_id)
            .bind(&parent_id)
            .bind(&parent_id)
            .bind(filter.top_level_only)
            .fetch_one(pool)
            .await?;
    Ok(total)
}

/// Communities ordered by name
pub async fn list(
    pool: &SqlitePool,
    filter: &CommunityFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<CommunitySummary>> {
    let pattern = search_term(filter.q.as_deref());
    let organization_id = filter.organization_id.map(|id| id.to_string());
    let parent_id = filter.parent_id.map(|id| id.to_string());

    let rows = sqlx::query(&format!(
        "{} {} ORDER BY c.name COLLATE NOCASE LIMIT ? OFFSET ?",
        SUMMARY_SELECT, FILTER_CLAUSE
    ))
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&organization_id)
    .bind(&organization_id)
    .bind(&parent_id)
    .bind(&parent_id)
    .bind(filter.top_level_only)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(summary_from_row).collect()
}

/// Direct children of a community
pub async fn branches(pool: &SqlitePool, id: Uuid) -> Result<Vec<CommunitySummary>> {
    let rows = sqlx::query(&format!(
        "{} WHERE c.parent_id = ? ORDER BY c.name COLLATE NOCASE",
        SUMMARY_SELECT
    ))
    .bind(id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(summary_from_row).collect()
}

pub async fn branch_count(pool: &SqlitePool, id: Uuid) -> Result<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM communities WHERE parent_id = ?")
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(total)
}

/// Top-level communities of an organization
pub async fn top_level(pool: &SqlitePool, organization_id: Uuid) -> Result<Vec<CommunitySummary>> {
    let rows = sqlx::query(&format!(
        "{} WHERE c.organization_id = ? AND c.parent_id IS NULL ORDER BY c.name COLLATE NOCASE",
        SUMMARY_SELECT
    ))
    .bind(organization_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(summary_from_row).collect()
}

/// The community id followed by its ancestors, nearest first
///
/// Empty when the community does not exist.
pub async fn lineage(pool: &SqlitePool, id: Uuid) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        WITH RECURSIVE lineage(id, parent_id, depth) AS (
            SELECT id, parent_id, 0 FROM communities WHERE id = ?
            UNION ALL
            SELECT c.id, c.parent_id, l.depth + 1
            FROM communities c
            JOIN lineage l ON c.id = l.parent_id
            WHERE l.depth < ?
        )
        SELECT id FROM lineage ORDER BY depth
        "#,
    )
    .bind(id.to_string())
    .bind(MAX_DEPTH)
    .fetch_all(pool)
    .await?;

    ids.iter()
        .map(|s| commune_common::db::parse_uuid(s))
        .collect()
}

pub async fn name_taken(
    pool: &SqlitePool,
    organization_id: Uuid,
    name: &str,
    except: Option<Uuid>,
) -> Result<bool> {
    let except = except.map(|id| id.to_string());
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM communities
        WHERE organization_id = ? AND name = ? COLLATE NOCASE
          AND (? IS NULL OR id != ?)
        "#,
    )
    .bind(organization_id.to_string())
    .bind(name)
    .bind(&except)
    .bind(&except)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Insert a community and make `founder` its ACTIVE member and admin
///
/// Runs in one transaction. The new membership becomes the founder's
/// primary when they have none.
pub async fn create_with_founder(
    pool: &SqlitePool,
    new: NewCommunity,
    founder: Uuid,
    now: DateTime<Utc>,
) -> Result<Community> {
    let community = Community {
        id: Uuid::new_v4(),
        organization_id: new.organization_id,
        parent_id: new.parent_id,
        name: new.name,
        description: new.description,
        location: new.location,
        requires_approval: new.requires_approval,
        currency: new.currency,
        created_by: Some(founder),
        created_at: now,
        updated_at: now,
    };

    let mut tx = pool.begin().await?;

    sqlx::query(&format!(
        "INSERT INTO communities ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        COMMUNITY_COLUMNS
    ))
    .bind(community.id.to_string())
    .bind(community.organization_id.to_string())
    .bind(community.parent_id.map(|id| id.to_string()))
    .bind(&community.name)
    .bind(&community.description)
    .bind(&community.location)
    .bind(community.requires_approval)
    .bind(&community.currency)
    .bind(founder.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    memberships::insert(&mut tx, founder, community.id, MembershipStatus::Active, now).await?;
    memberships::ensure_primary(&mut tx, founder, now).await?;

    sqlx::query(
        "INSERT INTO role_assignments (id, member_id, community_id, role, granted_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(founder.to_string())
    .bind(community.id.to_string())
    .bind(Role::CommunityAdmin.as_str())
    .bind(founder.to_string())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(community)
}

/// Persist edited name, description, location and approval flag
pub async fn update(pool: &SqlitePool, community: &Community, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE communities
        SET name = ?, description = ?, location = ?, requires_approval = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&community.name)
    .bind(&community.description)
    .bind(&community.location)
    .bind(community.requires_approval)
    .bind(now)
    .bind(community.id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_parent(
    pool: &SqlitePool,
    id: Uuid,
    parent_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE communities SET parent_id = ?, updated_at = ? WHERE id = ?")
        .bind(parent_id.map(|p| p.to_string()))
        .bind(now)
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Delete a community; dependent records cascade
pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM communities WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Members holding COMMUNITY_ADMIN on exactly this community
pub async fn admins(pool: &SqlitePool, id: Uuid) -> Result<Vec<MemberSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT m.id, m.name
        FROM role_assignments r
        JOIN members m ON m.id = r.member_id
        WHERE r.community_id = ? AND r.role = 'COMMUNITY_ADMIN'
        ORDER BY r.created_at
        "#,
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(MemberSummary {
                id: uuid_col(row, "id")?,
                name: row.try_get("name")?,
            })
        })
        .collect()
}
