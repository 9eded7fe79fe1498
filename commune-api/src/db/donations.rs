//! Donation and donation goal database operations
//!
//! Amounts are integer cents. Cancelled donations never count towards totals,
//! goal progress or the monthly breakdown.

use super::{opt_uuid_col, uuid_col};
use chrono::{DateTime, Utc};
use commune_common::db::{parse_stored, Donation, DonationGoal, DonationStatus};
use commune_common::time::month_key;
use commune_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

const GOAL_COLUMNS: &str =
    "id, community_id, title, description, target_cents, deadline, closed_at, created_by, created_at";

const DONATION_COLUMNS: &str = "d.id, d.community_id, d.goal_id, d.donor_id, d.amount_cents, \
     d.currency, d.anonymous, d.message, d.status, d.created_at, d.updated_at";

/// Funding state of one goal
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GoalProgress {
    pub received_cents: i64,
    pub pledged_cents: i64,
    /// Received amount as a percentage of the target, two decimals
    pub percent_funded: f64,
}

impl GoalProgress {
    pub fn new(received_cents: i64, pledged_cents: i64, target_cents: i64) -> Self {
        let percent_funded = if target_cents > 0 {
            (received_cents as f64 * 10_000.0 / target_cents as f64).round() / 100.0
        } else {
            0.0
        };
        Self {
            received_cents,
            pledged_cents,
            percent_funded,
        }
    }
}

/// Donation with the donor's display name
#[derive(Debug, Clone)]
pub struct DonationEntry {
    pub donation: Donation,
    pub donor_name: Option<String>,
}

/// Community-wide figures, cancelled donations excluded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DonationTotals {
    pub received_cents: i64,
    pub pledged_cents: i64,
    pub donation_count: i64,
    pub donor_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonthlyTotal {
    /// `YYYY-MM`
    pub month: String,
    pub received_cents: i64,
    pub pledged_cents: i64,
    pub donation_count: i64,
}

fn goal_from_row(row: &SqliteRow) -> Result<DonationGoal> {
    Ok(DonationGoal {
        id: uuid_col(row, "id")?,
        community_id: uuid_col(row, "community_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        target_cents: row.try_get("target_cents")?,
        deadline: row.try_get("deadline")?,
        closed_at: row.try_get("closed_at")?,
        created_by: opt_uuid_col(row, "created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<DonationEntry> {
    let status: String = row.try_get("status")?;
    Ok(DonationEntry {
        donation: Donation {
            id: uuid_col(row, "id")?,
            community_id: uuid_col(row, "community_id")?,
            goal_id: opt_uuid_col(row, "goal_id")?,
            donor_id: opt_uuid_col(row, "donor_id")?,
            amount_cents: row.try_get("amount_cents")?,
            currency: row.try_get("currency")?,
            anonymous: row.try_get("anonymous")?,
            message: row.try_get("message")?,
            status: parse_stored(&status)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        },
        donor_name: row.try_get("donor_name")?,
    })
}

// ---- Goals ----

pub async fn create_goal(pool: &SqlitePool, goal: &DonationGoal) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO donation_goals ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        GOAL_COLUMNS
    ))
    .bind(goal.id.to_string())
    .bind(goal.community_id.to_string())
    .bind(&goal.title)
    .bind(&goal.description)
    .bind(goal.target_cents)
    .bind(goal.deadline)
    .bind(goal.closed_at)
    .bind(goal.created_by.map(|id| id.to_string()))
    .bind(goal.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_goal(pool: &SqlitePool, id: Uuid) -> Result<Option<DonationGoal>> {
    let row = sqlx::query(&format!("SELECT {} FROM donation_goals WHERE id = ?", GOAL_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(goal_from_row).transpose()
}

/// Goals of a community, open goals first, newest first
pub async fn list_goals(pool: &SqlitePool, community_id: Uuid) -> Result<Vec<DonationGoal>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM donation_goals WHERE community_id = ?
         ORDER BY closed_at IS NOT NULL, created_at DESC",
        GOAL_COLUMNS
    ))
    .bind(community_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(goal_from_row).collect()
}

/// Close an open goal; false when it was already closed
pub async fn close_goal(pool: &SqlitePool, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query("UPDATE donation_goals SET closed_at = ? WHERE id = ? AND closed_at IS NULL")
        .bind(now)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Received and pledged sums per goal of a community
pub async fn goal_sums(pool: &SqlitePool, community_id: Uuid) -> Result<HashMap<Uuid, (i64, i64)>> {
    let rows = sqlx::query(
        r#"
        SELECT goal_id,
               COALESCE(SUM(CASE WHEN status = 'RECEIVED' THEN amount_cents END), 0) AS received,
               COALESCE(SUM(CASE WHEN status = 'PLEDGED' THEN amount_cents END), 0) AS pledged
        FROM community_donations
        WHERE community_id = ? AND goal_id IS NOT NULL
        GROUP BY goal_id
        "#,
    )
    .bind(community_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut sums = HashMap::new();
    for row in &rows {
        sums.insert(
            uuid_col(row, "goal_id")?,
            (row.try_get("received")?, row.try_get("pledged")?),
        );
    }
    Ok(sums)
}

// ---- Donations ----

pub async fn create_donation(pool: &SqlitePool, donation: &Donation) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO community_donations (
            id, community_id, goal_id, donor_id, amount_cents, currency, anonymous, message,
            status, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(donation.id.to_string())
    .bind(donation.community_id.to_string())
    .bind(donation.goal_id.map(|id| id.to_string()))
    .bind(donation.donor_id.map(|id| id.to_string()))
    .bind(donation.amount_cents)
    .bind(&donation.currency)
    .bind(donation.anonymous)
    .bind(&donation.message)
    .bind(donation.status.as_str())
    .bind(donation.created_at)
    .bind(donation.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_donation(pool: &SqlitePool, id: Uuid) -> Result<Option<DonationEntry>> {
    let row = sqlx::query(&format!(
        "SELECT {}, m.name AS donor_name
         FROM community_donations d LEFT JOIN members m ON m.id = d.donor_id
         WHERE d.id = ?",
        DONATION_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

pub async fn count_donations(
    pool: &SqlitePool,
    community_id: Uuid,
    status: Option<DonationStatus>,
) -> Result<i64> {
    let status = status.map(|s| s.as_str());
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM community_donations WHERE community_id = ? AND (? IS NULL OR status = ?)",
    )
    .bind(community_id.to_string())
    .bind(status)
    .bind(status)
    .fetch_one(pool)
    .await?;
    Ok(total)
}

/// Newest first
pub async fn list_donations(
    pool: &SqlitePool,
    community_id: Uuid,
    status: Option<DonationStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<DonationEntry>> {
    let status = status.map(|s| s.as_str());
    let rows = sqlx::query(&format!(
        "SELECT {}, m.name AS donor_name
         FROM community_donations d LEFT JOIN members m ON m.id = d.donor_id
         WHERE d.community_id = ? AND (? IS NULL OR d.status = ?)
         ORDER BY d.created_at DESC, d.id
         LIMIT ? OFFSET ?",
        DONATION_COLUMNS
    ))
    .bind(community_id.to_string())
    .bind(status)
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

/// Move a donation from `from` to `to`; false when its status was not `from`
pub async fn transition_status(
    pool: &SqlitePool,
    id: Uuid,
    from: DonationStatus,
    to: DonationStatus,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE community_donations SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(to.as_str())
    .bind(now)
    .bind(id.to_string())
    .bind(from.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

// ---- Statistics ----

pub async fn totals(pool: &SqlitePool, community_id: Uuid) -> Result<DonationTotals> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(CASE WHEN status = 'RECEIVED' THEN amount_cents END), 0) AS received,
               COALESCE(SUM(CASE WHEN status = 'PLEDGED' THEN amount_cents END), 0) AS pledged,
               COUNT(*) AS donation_count,
               COUNT(DISTINCT donor_id) AS donor_count
        FROM community_donations
        WHERE community_id = ? AND status != 'CANCELLED'
        "#,
    )
    .bind(community_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(DonationTotals {
        received_cents: row.try_get("received")?,
        pledged_cents: row.try_get("pledged")?,
        donation_count: row.try_get("donation_count")?,
        donor_count: row.try_get("donor_count")?,
    })
}

/// Per-month totals, oldest month first
pub async fn monthly(pool: &SqlitePool, community_id: Uuid) -> Result<Vec<MonthlyTotal>> {
    let rows = sqlx::query(
        "SELECT amount_cents, status, created_at FROM community_donations
         WHERE community_id = ? AND status != 'CANCELLED'",
    )
    .bind(community_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut months: BTreeMap<String, MonthlyTotal> = BTreeMap::new();
    for row in &rows {
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let status: String = row.try_get("status")?;
        let amount: i64 = row.try_get("amount_cents")?;

        let key = month_key(created_at);
        let entry = months.entry(key.clone()).or_insert_with(|| MonthlyTotal {
            month: key,
            ..MonthlyTotal::default()
        });
        entry.donation_count += 1;
        match parse_stored::<DonationStatus>(&status)? {
            DonationStatus::Received => {
                entry.received_cents = entry.received_cents.saturating_add(amount)
            }
            DonationStatus::Pledged => {
                entry.pledged_cents = entry.pledged_cents.saturating_add(amount)
            }
            DonationStatus::Cancelled => {}
        }
    }

    Ok(months.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::communities::{create_with_founder, NewCommunity};
    use crate::db::test_support::test_pool;
    use crate::db::{members, organizations};
    use chrono::TimeZone;

    fn donation(community_id: Uuid, donor_id: Uuid, amount_cents: i64, status: DonationStatus, at: DateTime<Utc>) -> Donation {
        Donation {
            id: Uuid::new_v4(),
            community_id,
            goal_id: None,
            donor_id: Some(donor_id),
            amount_cents,
            currency: "USD".to_string(),
            anonymous: false,
            message: None,
            status,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_totals_and_monthly_skip_cancelled() {
        let (pool, _dir) = test_pool().await;
        let jan = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let feb = Utc.with_ymd_and_hms(2024, 2, 3, 10, 0, 0).unwrap();

        let org = organizations::create(&pool, "Givers", None, jan).await.unwrap();
        let (donor, _) = members::find_or_create_by_email(&pool, "donor@example.org", Some("Dee"), jan)
            .await
            .unwrap();
        let community = create_with_founder(
            &pool,
            NewCommunity {
                organization_id: org.id,
                parent_id: None,
                name: "Pantry".to_string(),
                description: None,
                location: None,
                requires_approval: false,
                currency: "USD".to_string(),
            },
            donor.id,
            jan,
        )
        .await
        .unwrap();

        let goal = DonationGoal {
            id: Uuid::new_v4(),
            community_id: community.id,
            title: "Freezer".to_string(),
            description: None,
            target_cents: 8_000,
            deadline: None,
            closed_at: None,
            created_by: Some(donor.id),
            created_at: jan,
        };
        create_goal(&pool, &goal).await.unwrap();

        let mut for_goal = donation(community.id, donor.id, 2_000, DonationStatus::Received, jan);
        for_goal.goal_id = Some(goal.id);
        create_donation(&pool, &for_goal).await.unwrap();
        create_donation(&pool, &donation(community.id, donor.id, 500, DonationStatus::Pledged, feb))
            .await
            .unwrap();
        create_donation(&pool, &donation(community.id, donor.id, 9_000, DonationStatus::Cancelled, feb))
            .await
            .unwrap();

        let totals = totals(&pool, community.id).await.unwrap();
        assert_eq!(
            totals,
            DonationTotals {
                received_cents: 2_000,
                pledged_cents: 500,
                donation_count: 2,
                donor_count: 1,
            }
        );

        let months = monthly(&pool, community.id).await.unwrap();
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].month, "2024-01");
        assert_eq!(months[0].received_cents, 2_000);
        assert_eq!(months[1].month, "2024-02");
        assert_eq!(months[1].pledged_cents, 500);
        assert_eq!(months[1].donation_count, 1);

        let sums = goal_sums(&pool, community.id).await.unwrap();
        assert_eq!(sums.get(&goal.id), Some(&(2_000, 0)));

        let listed = list_donations(&pool, community.id, None, 10, 0).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].donor_name.as_deref(), Some("Dee"));

        // Settled donations do not move again
        assert!(!transition_status(&pool, for_goal.id, DonationStatus::Pledged, DonationStatus::Cancelled, feb)
            .await
            .unwrap());

        assert!(close_goal(&pool, goal.id, feb).await.unwrap());
        assert!(!close_goal(&pool, goal.id, feb).await.unwrap());
        assert!(!find_goal(&pool, goal.id).await.unwrap().unwrap().is_open());
    }

    #[test]
    fn test_percent_funded() {
        assert_eq!(GoalProgress::new(2_500, 0, 10_000).percent_funded, 25.0);
        assert_eq!(GoalProgress::new(1, 0, 3).percent_funded, 33.33);
        assert_eq!(GoalProgress::new(15_000, 0, 10_000).percent_funded, 150.0);
        assert_eq!(GoalProgress::new(0, 500, 10_000).percent_funded, 0.0);
    }
}
