//! Versioned migration pipeline
//!
//! Each version creates or alters target schema objects and backfills them
//! inside one transaction, then verifies the committed result. A version is
//! recorded in `schema_version` only after its verification passes, so a
//! failed run is retried on the next invocation.
//!
//! # Adding a migration
//!
//! 1. Add a module `vN_<name>.rs` exposing `pub async fn apply(ctx, summary)`
//! 2. Append a [`Migration`] entry to [`MIGRATIONS`]
//! 3. Dispatch it in [`apply_version`]
//! 4. Leave existing versions untouched; databases in the field already
//!    recorded them

pub mod v1_customers_vehicles;
pub mod v2_vin_primary_key;
pub mod v3_phone_columns;
pub mod v4_import_schema;
pub mod verify;

use crate::context::ReconContext;
use crate::summary::RunSummary;
use crm_common::db::{current_version, is_applied, record_version};
use crm_common::{Error, Result};
use tracing::{info, warn};

pub use verify::{verify, TableCount, VerificationReport};

/// One entry of the migration history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: i32,
    pub name: &'static str,
}

/// Every known migration, in application order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_customers_and_vehicles",
    },
    Migration {
        version: 2,
        name: "vin_primary_key",
    },
    Migration {
        version: 3,
        name: "customer_phone_columns",
    },
    Migration {
        version: 4,
        name: "import_schema",
    },
];

/// Highest version this build knows about
pub fn latest_version() -> i32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

fn lookup(version: i32) -> Result<Migration> {
    MIGRATIONS
        .iter()
        .copied()
        .find(|m| m.version == version)
        .ok_or_else(|| Error::Config(format!("Unknown migration version {}", version)))
}

/// Apply one migration version
///
/// A no-op when the version is already recorded. The previous version must
/// have been applied first.
pub async fn run_migration(ctx: &mut ReconContext, version: i32, summary: &mut RunSummary) -> Result<()> {
    let migration = lookup(version)?;

    {
        let mut conn = ctx.pool.acquire().await?;
        if is_applied(&mut conn, version).await? {
            info!("Migration v{} ({}) already applied - skipping", version, migration.name);
            summary.incr("versions_skipped");
            return Ok(());
        }
        if version > 1 && !is_applied(&mut conn, version - 1).await? {
            return Err(Error::Config(format!(
                "Migration v{} requires v{} to be applied first",
                version,
                version - 1
            )));
        }
    }

    info!("Running migration v{}: {}", version, migration.name);
    apply_version(ctx, version, summary).await?;

    // DDL ran: every cached column list may be stale
    ctx.refresh_catalog().await?;

    let mut conn = ctx.pool.acquire().await?;
    record_version(&mut conn, version, migration.name).await?;
    summary.incr("versions_applied");
    info!("✓ Migration v{} completed", version);
    Ok(())
}

async fn apply_version(ctx: &mut ReconContext, version: i32, summary: &mut RunSummary) -> Result<()> {
    match version {
        1 => v1_customers_vehicles::apply(ctx, summary).await,
        2 => v2_vin_primary_key::apply(ctx, summary).await,
        3 => v3_phone_columns::apply(ctx, summary).await,
        4 => v4_import_schema::apply(ctx, summary).await,
        other => Err(Error::Internal(format!("No implementation for migration v{}", other))),
    }
}

/// Apply every pending version in order
pub async fn run_pending(ctx: &mut ReconContext, summary: &mut RunSummary) -> Result<()> {
    let current = current_version(&ctx.pool).await?;
    let latest = latest_version();

    if current == latest {
        info!("Database schema is up to date (v{})", current);
        return Ok(());
    }
    if current > latest {
        warn!(
            "Database schema version (v{}) is newer than this build (v{})",
            current, latest
        );
        return Ok(());
    }

    info!("Migrating database schema from v{} to v{}", current, latest);
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        run_migration(ctx, migration.version, summary).await?;
    }
    info!("All migrations completed successfully");
    Ok(())
}

/// Fail unless the schema is at least at `version`
///
/// Importers call this before touching any table.
pub async fn require_version(ctx: &ReconContext, version: i32) -> Result<()> {
    let current = current_version(&ctx.pool).await?;
    if current < version {
        return Err(Error::Config(format!(
            "Database schema is at v{}, v{} required - run migrate first",
            current, version
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_common::config::Settings;
    use crm_common::db::{applied_versions, init_memory_database};

    async fn memory_context() -> ReconContext {
        let pool = init_memory_database().await.unwrap();
        ReconContext::with_pool(pool, Settings::default()).await.unwrap()
    }

    #[test]
    fn test_migration_list_is_contiguous() {
        for (idx, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version, idx as i32 + 1);
        }
        assert_eq!(latest_version(), 4);
    }

    #[tokio::test]
    async fn test_out_of_order_version_rejected() {
        let mut ctx = memory_context().await;
        let mut summary = RunSummary::new("migrate");

        let err = run_migration(&mut ctx, 3, &mut summary).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(applied_versions(&ctx.pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_version_rejected() {
        let mut ctx = memory_context().await;
        let mut summary = RunSummary::new("migrate");
        assert!(run_migration(&mut ctx, 99, &mut summary).await.is_err());
    }

    #[tokio::test]
    async fn test_run_pending_without_legacy_data() {
        let mut ctx = memory_context().await;
        let mut summary = RunSummary::new("migrate");

        run_pending(&mut ctx, &mut summary).await.unwrap();
        assert_eq!(applied_versions(&ctx.pool).await.unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(summary.counter("versions_applied"), 4);

        // Second run is a no-op
        run_pending(&mut ctx, &mut summary).await.unwrap();
        assert_eq!(summary.counter("versions_applied"), 4);

        require_version(&ctx, 4).await.unwrap();
    }

    #[tokio::test]
    async fn test_require_version_on_fresh_database() {
        let ctx = memory_context().await;
        let err = require_version(&ctx, 4).await.unwrap_err();
        assert!(err.to_string().contains("run migrate first"));
    }
}
