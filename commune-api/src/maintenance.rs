//! Periodic cleanup of spent credentials

use chrono::{DateTime, Utc};
use commune_common::time::now;
use commune_common::Result;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::{magic_links, sessions};

/// Rows removed by one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub magic_links: u64,
    pub sessions: u64,
}

/// Delete expired or spent magic links and expired or revoked sessions
pub async fn run_maintenance(db: &SqlitePool, now: DateTime<Utc>) -> Result<PurgeReport> {
    let report = PurgeReport {
        magic_links: magic_links::purge(db, now).await?,
        sessions: sessions::purge(db, now).await?,
    };

    if report.magic_links > 0 || report.sessions > 0 {
        info!(
            magic_links = report.magic_links,
            sessions = report.sessions,
            "Purged stale credentials"
        );
    } else {
        debug!("Maintenance pass: nothing to purge");
    }

    Ok(report)
}

/// Run [`run_maintenance`] every `interval` until the runtime shuts down
pub fn spawn_maintenance(db: SqlitePool, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = run_maintenance(&db, now()).await {
                warn!("Maintenance pass failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::members;
    use crate::db::test_support::test_pool;
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_purges_expired_credentials_only() {
        let (pool, _dir) = test_pool().await;
        let t0 = now();
        let (member, _) = members::find_or_create_by_email(&pool, "keeper@example.org", None, t0)
            .await
            .unwrap();

        // Expired link and a live one
        magic_links::insert(&pool, member.id, "expired-hash", t0 - ChronoDuration::minutes(1), t0)
            .await
            .unwrap();
        magic_links::insert(&pool, member.id, "live-hash", t0 + ChronoDuration::minutes(10), t0)
            .await
            .unwrap();

        // Expired session, revoked session and a live one
        sessions::create(&pool, Uuid::new_v4(), member.id, None, t0, t0 - ChronoDuration::hours(1))
            .await
            .unwrap();
        let revoked = Uuid::new_v4();
        sessions::create(&pool, revoked, member.id, None, t0, t0 + ChronoDuration::hours(1))
            .await
            .unwrap();
        sessions::revoke(&pool, revoked, t0).await.unwrap();
        let live = Uuid::new_v4();
        sessions::create(&pool, live, member.id, None, t0, t0 + ChronoDuration::hours(1))
            .await
            .unwrap();

        let report = run_maintenance(&pool, t0).await.unwrap();
        assert_eq!(report, PurgeReport { magic_links: 1, sessions: 2 });

        assert!(magic_links::find_by_hash(&pool, "live-hash").await.unwrap().is_some());
        assert!(sessions::find(&pool, live).await.unwrap().is_some());

        // Second pass finds nothing
        let report = run_maintenance(&pool, t0).await.unwrap();
        assert_eq!(report, PurgeReport::default());
    }
}
