//! Settings table access

use crate::Result;
use rand::RngCore;
use sqlx::SqlitePool;
use tracing::info;

/// Settings key holding the generated session signing secret
pub const SESSION_SECRET_KEY: &str = "session_secret";

/// Read a setting; `None` when missing or NULL
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(value.flatten())
}

/// Insert or replace a setting
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load the session signing secret, generating one on first use
///
/// 32 random bytes, hex encoded. Stored so that sessions survive restarts.
pub async fn load_or_create_session_secret(pool: &SqlitePool) -> Result<String> {
    if let Some(secret) = get_setting(pool, SESSION_SECRET_KEY).await? {
        if !secret.is_empty() {
            return Ok(secret);
        }
    }

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let secret = hex::encode(bytes);

    // INSERT OR IGNORE: a concurrent starter may have won the race
    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(SESSION_SECRET_KEY)
        .bind(&secret)
        .execute(pool)
        .await?;

    let stored = get_setting(pool, SESSION_SECRET_KEY).await?.unwrap_or(secret);
    info!("Generated session signing secret and stored it in settings");
    Ok(stored)
}
