//! v2: VIN becomes the vehicle primary key
//!
//! The surrogate-keyed table is kept as `vehicles_v1`. Each of its rows is
//! triaged, oldest first, into exactly one of: migrated, missing VIN,
//! invalid VIN format, duplicate VIN. Rows that are not migrated are parked
//! in `vehicles_legacy_no_vin` with the reason.

use super::verify::QUARANTINE_TABLE;
use crate::context::ReconContext;
use crate::db::vehicles::{insert_quarantined, upsert_vehicle, QuarantinedVehicle, VehicleFields};
use crate::decode::ManualOverrides;
use crate::discovery::snapshot_rows;
use crate::row::LegacyRow;
use crate::summary::RunSummary;
use crate::vin::{normalize_vin, validate_vin, Vin, VinRejection};
use crm_common::db::{count_rows, table_exists, TARGET_SCHEMA};
use crm_common::{Error, Result};
use serde_json::Value;
use sqlx::SqliteConnection;
use std::collections::HashSet;
use tracing::{info, warn};

const PREVIOUS_TABLE: &str = "vehicles_v1";

const CREATE_DECODE_CACHE: &str = r#"
    CREATE TABLE IF NOT EXISTS vin_decode_cache (
        vin TEXT PRIMARY KEY,
        decoded_at TEXT NOT NULL DEFAULT (datetime('now')),
        decoded_source TEXT NOT NULL DEFAULT 'nhtsa_vpic',
        result_json TEXT NOT NULL
    )
"#;

const CREATE_QUARANTINE: &str = r#"
    CREATE TABLE IF NOT EXISTS vehicles_legacy_no_vin (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_vehicle_id INTEGER,
        customer_id INTEGER REFERENCES customers(id) ON DELETE CASCADE,
        legacy_vehicle_id TEXT,
        year INTEGER,
        make TEXT,
        model TEXT,
        trim TEXT,
        color TEXT,
        plate TEXT,
        vin TEXT,
        mileage INTEGER,
        notes TEXT,
        reason TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
"#;

const CREATE_VEHICLES: &str = r#"
    CREATE TABLE IF NOT EXISTS vehicles (
        vin TEXT PRIMARY KEY,
        customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
        year INTEGER,
        make TEXT,
        model TEXT,
        trim TEXT,
        color TEXT,
        plate TEXT,
        mileage INTEGER,
        notes TEXT,
        decoded_source TEXT,
        decoded_at TEXT,
        raw_decode TEXT,
        manual_overrides TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
"#;

// The unique index backs the conflict check of quarantine inserts; a
// missing VIN is indexed as '' so repeated rows without one still collide
const QUARANTINE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_vehicles_legacy_no_vin_customer_id ON vehicles_legacy_no_vin(customer_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_vehicles_legacy_no_vin_source ON vehicles_legacy_no_vin(source_vehicle_id, COALESCE(vin, ''))",
];

const VEHICLE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_vehicles_customer_id ON vehicles(customer_id)",
    "CREATE INDEX IF NOT EXISTS idx_vehicles_make ON vehicles(make)",
    "CREATE INDEX IF NOT EXISTS idx_vehicles_model ON vehicles(model)",
];

/// Triage outcome of one pre-VIN-key vehicle row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Triage {
    Migrate(Vin),
    Quarantine(VinRejection),
}

/// Classify a raw VIN; `seen` holds the VINs already migrated this pass
pub fn triage_vin(raw: Option<&str>, seen: &HashSet<Vin>) -> Triage {
    let normalized = raw.map(normalize_vin).filter(|v| !v.is_empty());
    let Some(normalized) = normalized else {
        return Triage::Quarantine(VinRejection::MissingVin);
    };
    match validate_vin(&normalized) {
        None => Triage::Quarantine(VinRejection::InvalidVinFormat),
        Some(vin) if seen.contains(&vin) => Triage::Quarantine(VinRejection::DuplicateVin),
        Some(vin) => Triage::Migrate(vin),
    }
}

pub async fn apply(ctx: &mut ReconContext, summary: &mut RunSummary) -> Result<()> {
    let mut tx = ctx.pool.begin().await?;

    sqlx::query(CREATE_DECODE_CACHE).execute(&mut *tx).await?;
    sqlx::query(CREATE_QUARANTINE).execute(&mut *tx).await?;
    for index in QUARANTINE_INDEXES {
        sqlx::query(index).execute(&mut *tx).await?;
    }

    if table_exists(&mut tx, TARGET_SCHEMA, PREVIOUS_TABLE).await? {
        // An earlier run got past the changeover but failed verification
        info!("  {} already exists - skipping changeover", PREVIOUS_TABLE);
    } else {
        sqlx::query("ALTER TABLE vehicles RENAME TO vehicles_v1")
            .execute(&mut *tx)
            .await?;
        sqlx::query(CREATE_VEHICLES).execute(&mut *tx).await?;
        info!("  ✓ Renamed vehicles to {} and created VIN-keyed vehicles", PREVIOUS_TABLE);

        let rows = snapshot_rows(&mut tx, TARGET_SCHEMA, PREVIOUS_TABLE, &["created_at", "id"]).await?;
        triage(&mut tx, &rows, summary).await?;
    }

    for index in VEHICLE_INDEXES {
        sqlx::query(index).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    let mut conn = ctx.pool.acquire().await?;
    let total = count_rows(&mut conn, TARGET_SCHEMA, PREVIOUS_TABLE).await?;
    let migrated = count_rows(&mut conn, TARGET_SCHEMA, "vehicles").await?;
    let quarantined = count_rows(&mut conn, TARGET_SCHEMA, QUARANTINE_TABLE).await?;
    if total != migrated + quarantined {
        return Err(Error::Verification {
            table: "vehicles".to_string(),
            legacy: total,
            migrated: migrated + quarantined,
        });
    }
    info!(
        "  ✓ Vehicle triage verified: total={}, migrated={}, quarantined={}",
        total, migrated, quarantined
    );
    Ok(())
}

async fn triage(conn: &mut SqliteConnection, rows: &[LegacyRow], summary: &mut RunSummary) -> Result<()> {
    let mut seen: HashSet<Vin> = HashSet::new();
    let mut migrated = 0u64;
    let mut quarantined = 0u64;

    for row in rows {
        summary.processed += 1;
        let raw_vin = row.text(&["vin"]);

        match triage_vin(raw_vin.as_deref(), &seen) {
            Triage::Migrate(vin) => {
                let Some(customer_id) = row.int(&["customer_id"]) else {
                    return Err(Error::Internal(format!("{} row without customer_id", PREVIOUS_TABLE)));
                };

                let mut fields = VehicleFields::new(vin.clone(), customer_id);
                fields.year = row.int(&["year"]);
                fields.make = row.text(&["make"]);
                fields.model = row.text(&["model"]);
                fields.trim = row.text(&["trim"]);
                fields.color = row.text(&["color"]);
                fields.plate = row.text(&["plate"]);
                fields.mileage = row.int(&["mileage"]);
                fields.notes = row.text(&["notes"]);
                fields.created_at = row.date(&["created_at"]);
                fields.updated_at = row.date(&["updated_at"]);

                let mut overrides = ManualOverrides::default();
                if let Some(legacy_id) = row.text(&["legacy_vehicle_id"]) {
                    overrides.insert("legacy_vehicle_id", Value::from(legacy_id));
                }

                upsert_vehicle(conn, &fields, &overrides).await?;
                seen.insert(vin);
                migrated += 1;
            }
            Triage::Quarantine(reason) => {
                let parked = QuarantinedVehicle {
                    source_vehicle_id: row.int(&["id"]),
                    customer_id: row.int(&["customer_id"]),
                    legacy_vehicle_id: row.text(&["legacy_vehicle_id"]),
                    year: row.int(&["year"]),
                    make: row.text(&["make"]),
                    model: row.text(&["model"]),
                    trim: row.text(&["trim"]),
                    color: row.text(&["color"]),
                    plate: row.text(&["plate"]),
                    vin: raw_vin,
                    mileage: row.int(&["mileage"]),
                    notes: row.text(&["notes"]),
                    reason,
                    created_at: row.date(&["created_at"]),
                    updated_at: row.date(&["updated_at"]),
                };
                insert_quarantined(conn, &parked).await?;
                summary.incr(reason.as_str());
                quarantined += 1;
            }
        }
    }

    summary.migrated += migrated;
    summary.skipped += quarantined;
    summary.add("vehicles_migrated", migrated);
    summary.add("vehicles_quarantined", quarantined);
    if quarantined > 0 {
        warn!("  {} vehicles quarantined in {}", quarantined, QUARANTINE_TABLE);
    }
    info!("  ✓ Migrated {} vehicles to VIN keys", migrated);
    Ok(())
}
