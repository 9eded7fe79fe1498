//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up to date:
//! 1. `CREATE TABLE IF NOT EXISTS` for every table (fresh databases)
//! 2. Versioned migrations for databases created by older releases
//!
//! Every step is idempotent, so `prepare_schema` is safe on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Open (or create) the database at `db_path` and prepare the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Foreign keys are per-connection in SQLite, so they go in the connect options
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    prepare_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes, then run pending migrations
pub async fn prepare_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_organizations_table(pool).await?;
    create_members_table(pool).await?;
    create_communities_table(pool).await?;
    create_memberships_table(pool).await?;
    create_role_assignments_table(pool).await?;

    // Authentication
    create_magic_link_tokens_table(pool).await?;
    create_sessions_table(pool).await?;

    // Community records
    create_meeting_minutes_table(pool).await?;
    create_donation_goals_table(pool).await?;
    create_donations_table(pool).await?;

    // Marketplace
    create_service_providers_table(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores service-owned key-value pairs (e.g. the generated session secret).
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_organizations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_members_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT,
            phone TEXT,
            bio TEXT,
            email_verified INTEGER NOT NULL DEFAULT 0,
            last_login_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the communities table
///
/// `parent_id` forms the branch hierarchy. `ON DELETE RESTRICT` keeps a
/// parent from disappearing under its branches.
async fn create_communities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS communities (
            id TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            parent_id TEXT REFERENCES communities(id) ON DELETE RESTRICT,
            name TEXT NOT NULL,
            description TEXT,
            location TEXT,
            requires_approval INTEGER NOT NULL DEFAULT 0,
            currency TEXT NOT NULL DEFAULT 'USD',
            created_by TEXT REFERENCES members(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (parent_id IS NULL OR parent_id != id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_communities_org_name
         ON communities(organization_id, name COLLATE NOCASE)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_communities_parent ON communities(parent_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the community_memberships table
///
/// One row per (member, community). The partial unique index allows at most
/// one primary membership per member.
async fn create_memberships_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS community_memberships (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            status TEXT NOT NULL CHECK (status IN ('PENDING', 'ACTIVE', 'INACTIVE', 'SUSPENDED')),
            is_primary INTEGER NOT NULL DEFAULT 0,
            joined_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (member_id, community_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_memberships_one_primary
         ON community_memberships(member_id) WHERE is_primary = 1",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_memberships_community
         ON community_memberships(community_id, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the role_assignments table
///
/// COMMUNITY_ADMIN rows are scoped to a community; SUPER_ADMIN rows are global
/// (`community_id IS NULL`). SQLite treats NULLs as distinct in UNIQUE
/// constraints, hence the two partial indexes.
async fn create_role_assignments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS role_assignments (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            community_id TEXT REFERENCES communities(id) ON DELETE CASCADE,
            role TEXT NOT NULL CHECK (role IN ('COMMUNITY_ADMIN', 'SUPER_ADMIN')),
            granted_by TEXT REFERENCES members(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            CHECK (
                (role = 'SUPER_ADMIN' AND community_id IS NULL)
                OR (role = 'COMMUNITY_ADMIN' AND community_id IS NOT NULL)
            )
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_roles_scoped
         ON role_assignments(member_id, community_id, role) WHERE community_id IS NOT NULL",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_roles_global
         ON role_assignments(member_id, role) WHERE community_id IS NULL",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the magic_link_tokens table
///
/// Only the SHA-256 digest of a token is stored.
async fn create_magic_link_tokens_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS magic_link_tokens (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            token_hash TEXT NOT NULL UNIQUE,
            expires_at TEXT NOT NULL,
            used_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            user_agent TEXT,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            revoked_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_member ON sessions(member_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the meeting_minutes table
///
/// `attendees` holds a JSON array of names; `meeting_date` is `YYYY-MM-DD`.
async fn create_meeting_minutes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meeting_minutes (
            id TEXT PRIMARY KEY,
            community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            meeting_date TEXT NOT NULL,
            attendees TEXT NOT NULL DEFAULT '[]',
            agenda TEXT,
            content TEXT NOT NULL,
            decisions TEXT,
            created_by TEXT REFERENCES members(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_minutes_community
         ON meeting_minutes(community_id, meeting_date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_donation_goals_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS donation_goals (
            id TEXT PRIMARY KEY,
            community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT,
            target_cents INTEGER NOT NULL CHECK (target_cents > 0),
            deadline TEXT,
            closed_at TEXT,
            created_by TEXT REFERENCES members(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_donations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS community_donations (
            id TEXT PRIMARY KEY,
            community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            goal_id TEXT REFERENCES donation_goals(id) ON DELETE SET NULL,
            donor_id TEXT REFERENCES members(id) ON DELETE SET NULL,
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            currency TEXT NOT NULL,
            anonymous INTEGER NOT NULL DEFAULT 0,
            message TEXT,
            status TEXT NOT NULL CHECK (status IN ('PLEDGED', 'RECEIVED', 'CANCELLED')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_donations_community
         ON community_donations(community_id, status)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_donations_goal ON community_donations(goal_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_service_providers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS service_providers (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            category TEXT NOT NULL CHECK (category IN
                ('CATERING', 'VENUE', 'PHOTOGRAPHY', 'MUSIC', 'DECOR', 'PLANNING', 'OTHER')),
            description TEXT,
            location TEXT,
            price_min_cents INTEGER CHECK (price_min_cents IS NULL OR price_min_cents >= 0),
            price_max_cents INTEGER CHECK (price_max_cents IS NULL OR price_max_cents >= 0),
            contact_email TEXT NOT NULL,
            contact_phone TEXT,
            website TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (price_min_cents IS NULL OR price_max_cents IS NULL OR price_min_cents <= price_max_cents)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_providers_category ON service_providers(category)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
