//! Database access layer for commune-api
//!
//! One module per entity. Queries are runtime `sqlx` queries against the
//! schema created by `commune_common::db::init_database`.

pub mod communities;
pub mod donations;
pub mod magic_links;
pub mod members;
pub mod memberships;
pub mod minutes;
pub mod organizations;
pub mod providers;
pub mod roles;
pub mod sessions;

use commune_common::db::parse_uuid;
use commune_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Read a TEXT column holding a UUID
pub(crate) fn uuid_col(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let value: String = row.try_get(column)?;
    parse_uuid(&value)
}

/// Read a nullable TEXT column holding a UUID
pub(crate) fn opt_uuid_col(row: &SqliteRow, column: &str) -> Result<Option<Uuid>> {
    let value: Option<String> = row.try_get(column)?;
    value.as_deref().map(parse_uuid).transpose()
}

/// Build a `LIKE ... ESCAPE '\'` pattern matching `term` anywhere
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Empty search terms are treated as absent
pub(crate) fn search_term(q: Option<&str>) -> Option<String> {
    q.map(str::trim).filter(|s| !s.is_empty()).map(like_pattern)
}
