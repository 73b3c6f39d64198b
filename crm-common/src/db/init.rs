//! Database initialization
//!
//! The target CRM tables live in the `main` schema of the target database.
//! The legacy database (old relational export) is attached to every pooled
//! connection as the `legacy` schema so discovery and backfills can read it
//! with plain SQL. When no legacy database is configured, or the configured
//! file does not exist, an empty in-memory database is attached instead and
//! migrations run in degraded mode (target schema without copied data).

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Schema name of the target tables
pub const TARGET_SCHEMA: &str = "main";
/// Schema name the legacy database is attached under
pub const LEGACY_SCHEMA: &str = "legacy";

const IN_MEMORY: &str = ":memory:";

/// Open (creating if needed) the target database and attach the legacy one
pub async fn init_database(db_path: &Path, legacy_path: Option<&Path>) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let legacy_target = resolve_legacy_target(legacy_path);

    let pool = attach_legacy(SqlitePoolOptions::new().max_connections(4), legacy_target)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    crate::db::versions::ensure_version_table(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with an empty attached legacy schema
///
/// Used by tests and dry runs. One connection only: every SQLite in-memory
/// connection is its own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = attach_legacy(
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None),
        IN_MEMORY.to_string(),
    )
    .connect_with(options)
    .await?;

    crate::db::versions::ensure_version_table(&pool).await?;

    Ok(pool)
}

fn resolve_legacy_target(legacy_path: Option<&Path>) -> String {
    match legacy_path {
        Some(path) if path.exists() => {
            info!("Legacy database: {}", path.display());
            path.to_string_lossy().into_owned()
        }
        Some(path) => {
            warn!(
                "Legacy database {} not found - attaching empty legacy schema",
                path.display()
            );
            IN_MEMORY.to_string()
        }
        None => {
            info!("No legacy database configured - attaching empty legacy schema");
            IN_MEMORY.to_string()
        }
    }
}

fn attach_legacy(options: SqlitePoolOptions, legacy_target: String) -> SqlitePoolOptions {
    options.after_connect(move |conn, _meta| {
        let target = legacy_target.clone();
        Box::pin(async move {
            sqlx::query(&format!("ATTACH DATABASE ? AS {}", LEGACY_SCHEMA))
                .bind(target)
                .execute(&mut *conn)
                .await?;
            Ok(())
        })
    })
}
