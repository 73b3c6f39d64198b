//! Row-count verification of migrated data against the legacy source

use crate::context::ReconContext;
use crate::summary::RunSummary;
use crate::synonyms;
use crm_common::db::{count_rows, LEGACY_SCHEMA, TARGET_SCHEMA};
use crm_common::{Error, Result};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{error, info};

/// Target table that parks vehicles rejected by VIN triage
pub const QUARANTINE_TABLE: &str = "vehicles_legacy_no_vin";

/// Legacy vs migrated row count of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub legacy_table: Option<String>,
    /// `None` when no legacy table was found
    pub legacy: Option<i64>,
    pub migrated: i64,
}

impl TableCount {
    pub fn matches(&self) -> bool {
        self.legacy.map_or(true, |legacy| legacy == self.migrated)
    }

    pub fn ensure(&self) -> Result<()> {
        match self.legacy {
            Some(legacy) if legacy != self.migrated => Err(Error::Verification {
                table: self.table.clone(),
                legacy,
                migrated: self.migrated,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    pub tables: Vec<TableCount>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.tables.iter().all(TableCount::matches)
    }

    /// First mismatch as a [`Error::Verification`]
    pub fn ensure(&self) -> Result<()> {
        self.tables.iter().try_for_each(TableCount::ensure)
    }
}

/// Count legacy rows against target rows
///
/// `migrated_tables` are summed: vehicles that were quarantined during VIN
/// triage still count as accounted for.
pub async fn compare_counts(
    conn: &mut SqliteConnection,
    table: &str,
    legacy_table: Option<&str>,
    migrated_tables: &[&str],
) -> Result<TableCount> {
    let legacy = match legacy_table {
        Some(legacy_table) => Some(count_rows(conn, LEGACY_SCHEMA, legacy_table).await?),
        None => None,
    };

    let mut migrated = 0;
    for target in migrated_tables {
        migrated += count_rows(conn, TARGET_SCHEMA, target).await?;
    }

    Ok(TableCount {
        table: table.to_string(),
        legacy_table: legacy_table.map(str::to_string),
        legacy,
        migrated,
    })
}

/// Compare every legacy table with its migrated counterpart
pub async fn verify(ctx: &mut ReconContext) -> Result<VerificationReport> {
    let catalog = ctx.catalog().await?;
    let legacy_customers = catalog.find_table(LEGACY_SCHEMA, synonyms::tables::CUSTOMERS);
    let legacy_vehicles = catalog.find_table(LEGACY_SCHEMA, synonyms::tables::VEHICLES);

    let present = |table: &str| catalog.has_table(TARGET_SCHEMA, table);
    let customer_tables: Vec<&str> = ["customers"].into_iter().filter(|t| present(t)).collect();
    let vehicle_tables: Vec<&str> = ["vehicles", QUARANTINE_TABLE]
        .into_iter()
        .filter(|t| present(t))
        .collect();

    let mut conn = ctx.pool.acquire().await?;
    let report = VerificationReport {
        tables: vec![
            compare_counts(&mut conn, "customers", legacy_customers.as_deref(), &customer_tables).await?,
            compare_counts(&mut conn, "vehicles", legacy_vehicles.as_deref(), &vehicle_tables).await?,
        ],
    };

    for count in &report.tables {
        match count.legacy {
            Some(legacy) => info!(
                "{}: legacy={} ({}), migrated={}",
                count.table,
                legacy,
                count.legacy_table.as_deref().unwrap_or("?"),
                count.migrated
            ),
            None => info!("{}: no legacy table, migrated={}", count.table, count.migrated),
        }
    }
    Ok(report)
}

/// Standalone verification run: tallies counts into `summary` and fails on
/// any mismatch
pub async fn run_verify(ctx: &mut ReconContext, summary: &mut RunSummary) -> Result<VerificationReport> {
    let report = verify(ctx).await?;

    for count in &report.tables {
        if let Some(legacy) = count.legacy {
            summary.add(&format!("legacy_{}", count.table), legacy.max(0) as u64);
        }
        summary.add(&format!("new_{}", count.table), count.migrated.max(0) as u64);
    }

    if let Err(e) = report.ensure() {
        error!("Verification failed: record counts do not match");
        return Err(e);
    }
    info!("✓ Verification passed: counts are aligned");
    Ok(report)
}
