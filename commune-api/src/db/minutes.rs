//! Meeting minutes database operations

use super::{opt_uuid_col, uuid_col};
use chrono::{DateTime, Utc};
use commune_common::db::MeetingMinutes;
use commune_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const MINUTES_COLUMNS: &str = "id, community_id, title, meeting_date, attendees, agenda, content, \
     decisions, created_by, created_at, updated_at";

fn minutes_from_row(row: &SqliteRow) -> Result<MeetingMinutes> {
    let attendees: String = row.try_get("attendees")?;
    let attendees = serde_json::from_str(&attendees)
        .map_err(|e| Error::Internal(format!("Corrupt attendees list: {}", e)))?;

    Ok(MeetingMinutes {
        id: uuid_col(row, "id")?,
        community_id: uuid_col(row, "community_id")?,
        title: row.try_get("title")?,
        meeting_date: row.try_get("meeting_date")?,
        attendees,
        agenda: row.try_get("agenda")?,
        content: row.try_get("content")?,
        decisions: row.try_get("decisions")?,
        created_by: opt_uuid_col(row, "created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn attendees_json(attendees: &[String]) -> Result<String> {
    serde_json::to_string(attendees)
        .map_err(|e| Error::Internal(format!("Serialize attendees failed: {}", e)))
}

pub async fn create(pool: &SqlitePool, minutes: &MeetingMinutes) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO meeting_minutes ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        MINUTES_COLUMNS
    ))
    .bind(minutes.id.to_string())
    .bind(minutes.community_id.to_string())
    .bind(&minutes.title)
    .bind(minutes.meeting_date)
    .bind(attendees_json(&minutes.attendees)?)
    .bind(&minutes.agenda)
    .bind(&minutes.content)
    .bind(&minutes.decisions)
    .bind(minutes.created_by.map(|id| id.to_string()))
    .bind(minutes.created_at)
    .bind(minutes.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<MeetingMinutes>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM meeting_minutes WHERE id = ?",
        MINUTES_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(minutes_from_row).transpose()
}

pub async fn count_for_community(pool: &SqlitePool, community_id: Uuid) -> Result<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM meeting_minutes WHERE community_id = ?")
        .bind(community_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(total)
}

/// Newest meeting first
pub async fn list_for_community(
    pool: &SqlitePool,
    community_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<MeetingMinutes>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM meeting_minutes WHERE community_id = ?
         ORDER BY meeting_date DESC, created_at DESC LIMIT ? OFFSET ?",
        MINUTES_COLUMNS
    ))
    .bind(community_id.to_string())
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(minutes_from_row).collect()
}

pub async fn update(pool: &SqlitePool, minutes: &MeetingMinutes, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE meeting_minutes
        SET title = ?, meeting_date = ?, attendees = ?, agenda = ?, content = ?, decisions = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&minutes.title)
    .bind(minutes.meeting_date)
    .bind(attendees_json(&minutes.attendees)?)
    .bind(&minutes.agenda)
    .bind(&minutes.content)
    .bind(&minutes.decisions)
    .bind(now)
    .bind(minutes.id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM meeting_minutes WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
