//! Schema version bookkeeping
//!
//! Every applied migration version is recorded as one row in
//! `schema_version`. The table is the only source of truth for "already
//! applied"; migrations consult it before doing any work so repeated deploys
//! are no-ops.

use crate::Result;
use sqlx::{SqliteConnection, SqlitePool};

/// Create the `schema_version` table if needed
pub async fn ensure_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Highest applied version, 0 when nothing has been applied
pub async fn current_version(pool: &SqlitePool) -> Result<i32> {
    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

/// All applied versions in ascending order
pub async fn applied_versions(pool: &SqlitePool) -> Result<Vec<i32>> {
    let versions: Vec<i32> = sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(versions)
}

/// Whether a specific version has been applied
pub async fn is_applied(conn: &mut SqliteConnection, version: i32) -> Result<bool> {
    let applied: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM schema_version WHERE version = ?)")
            .bind(version)
            .fetch_one(&mut *conn)
            .await?;

    Ok(applied)
}

/// Record a version as applied (no-op when already recorded)
pub async fn record_version(conn: &mut SqliteConnection, version: i32, name: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version, name) VALUES (?, ?)")
        .bind(version)
        .bind(name)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
