//! `vehicles` (VIN-keyed) and `vehicles_legacy_no_vin` table access

use crate::decode::{DecodeOutcome, DecodedVehicle, ManualOverrides};
use crate::vin::{Vin, VinRejection};
use chrono::{DateTime, Utc};
use crm_common::Result;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, SqliteConnection};

/// Values for one VIN-keyed vehicle write
#[derive(Debug, Clone)]
pub struct VehicleFields {
    pub vin: Vin,
    pub customer_id: i64,
    pub year: Option<i64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub color: Option<String>,
    pub plate: Option<String>,
    pub mileage: Option<i64>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl VehicleFields {
    pub fn new(vin: Vin, customer_id: i64) -> Self {
        Self {
            vin,
            customer_id,
            year: None,
            make: None,
            model: None,
            trim: None,
            color: None,
            plate: None,
            mileage: None,
            notes: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Stored vehicle row
#[derive(Debug, Clone, FromRow)]
pub struct VehicleRecord {
    pub vin: String,
    pub customer_id: i64,
    pub year: Option<i64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub color: Option<String>,
    pub plate: Option<String>,
    pub mileage: Option<i64>,
    pub notes: Option<String>,
    pub decoded_source: Option<String>,
    pub decoded_at: Option<DateTime<Utc>>,
    pub raw_decode: Option<Json<Value>>,
    pub manual_overrides: Option<Json<Value>>,
}

impl VehicleRecord {
    pub fn overrides(&self) -> ManualOverrides {
        ManualOverrides::from_stored(self.manual_overrides.as_ref().map(|j| &j.0))
    }
}

/// Whether an upsert created the vehicle or updated an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

pub async fn get_vehicle(conn: &mut SqliteConnection, vin: &str) -> Result<Option<VehicleRecord>> {
    let record = sqlx::query_as::<_, VehicleRecord>(
        r#"
        SELECT vin, customer_id, year, make, model, trim, color, plate, mileage, notes,
               decoded_source, decoded_at, raw_decode, manual_overrides
        FROM vehicles WHERE vin = ?
        "#,
    )
    .bind(vin)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(record)
}

/// Insert a vehicle or fill an existing one
///
/// Ownership follows the latest write. Attribute columns only take new
/// non-empty values. `entered` is recorded into the vehicle's manual
/// overrides so a later decode cannot replace it.
pub async fn upsert_vehicle(
    conn: &mut SqliteConnection,
    fields: &VehicleFields,
    entered: &ManualOverrides,
) -> Result<UpsertOutcome> {
    let existing = get_vehicle(conn, fields.vin.as_str()).await?;

    let mut overrides = existing
        .as_ref()
        .map(VehicleRecord::overrides)
        .unwrap_or_default();
    for (key, value) in entered.as_map() {
        overrides.insert(key, value.clone());
    }

    sqlx::query(
        r#"
        INSERT INTO vehicles (
            vin, customer_id, year, make, model, trim, color, plate, mileage, notes,
            manual_overrides, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                COALESCE(?, datetime('now')), COALESCE(?, datetime('now')))
        ON CONFLICT(vin) DO UPDATE SET
            customer_id = excluded.customer_id,
            year = COALESCE(excluded.year, vehicles.year),
            make = COALESCE(NULLIF(excluded.make, ''), vehicles.make),
            model = COALESCE(NULLIF(excluded.model, ''), vehicles.model),
            trim = COALESCE(NULLIF(excluded.trim, ''), vehicles.trim),
            color = COALESCE(NULLIF(excluded.color, ''), vehicles.color),
            plate = COALESCE(NULLIF(excluded.plate, ''), vehicles.plate),
            mileage = COALESCE(excluded.mileage, vehicles.mileage),
            notes = COALESCE(NULLIF(excluded.notes, ''), vehicles.notes),
            manual_overrides = COALESCE(excluded.manual_overrides, vehicles.manual_overrides),
            updated_at = datetime('now')
        "#,
    )
    .bind(fields.vin.as_str())
    .bind(fields.customer_id)
    .bind(fields.year)
    .bind(&fields.make)
    .bind(&fields.model)
    .bind(&fields.trim)
    .bind(&fields.color)
    .bind(&fields.plate)
    .bind(fields.mileage)
    .bind(&fields.notes)
    .bind(overrides.to_stored().map(Json))
    .bind(fields.created_at)
    .bind(fields.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(if existing.is_some() {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Created
    })
}

/// Write a decode result onto a stored vehicle, keeping overridden fields
///
/// Returns `false` when no vehicle has this VIN.
pub async fn apply_decode(conn: &mut SqliteConnection, outcome: &DecodeOutcome) -> Result<bool> {
    let Some(existing) = get_vehicle(conn, outcome.vin.as_str()).await? else {
        return Ok(false);
    };
    let overrides = existing.overrides();

    let pick_text = |field: &str, stored: &Option<String>, decoded: &Option<String>| {
        if overrides.contains(field) {
            stored.clone()
        } else {
            decoded.clone().or_else(|| stored.clone())
        }
    };
    let year = if overrides.contains("year") {
        existing.year
    } else {
        outcome.parsed.year.or(existing.year)
    };

    sqlx::query(
        r#"
        UPDATE vehicles SET
            year = ?, make = ?, model = ?, trim = ?,
            decoded_source = ?, decoded_at = ?, raw_decode = ?,
            updated_at = datetime('now')
        WHERE vin = ?
        "#,
    )
    .bind(year)
    .bind(pick_text("make", &existing.make, &outcome.parsed.make))
    .bind(pick_text("model", &existing.model, &outcome.parsed.model))
    .bind(pick_text("trim", &existing.trim, &outcome.parsed.trim))
    .bind(&outcome.source)
    .bind(outcome.decoded_at)
    .bind(Json(&outcome.raw))
    .bind(outcome.vin.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(true)
}

/// Store user-entered fields on a vehicle and mark them as overridden
///
/// Returns the vehicle's resulting overrides, `None` when no vehicle has
/// this VIN.
pub async fn record_manual_overrides(
    conn: &mut SqliteConnection,
    vin: &Vin,
    entered: &DecodedVehicle,
) -> Result<Option<ManualOverrides>> {
    let Some(existing) = get_vehicle(conn, vin.as_str()).await? else {
        return Ok(None);
    };

    let mut overrides = existing.overrides();
    overrides.record(entered);

    sqlx::query(
        r#"
        UPDATE vehicles SET
            year = COALESCE(?, year),
            make = COALESCE(?, make),
            model = COALESCE(?, model),
            trim = COALESCE(?, trim),
            manual_overrides = ?,
            updated_at = datetime('now')
        WHERE vin = ?
        "#,
    )
    .bind(entered.year)
    .bind(&entered.make)
    .bind(&entered.model)
    .bind(&entered.trim)
    .bind(overrides.to_stored().map(Json))
    .bind(vin.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(Some(overrides))
}

/// Every stored VIN with its owner
pub async fn load_vin_owners(conn: &mut SqliteConnection) -> Result<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as("SELECT vin, customer_id FROM vehicles ORDER BY vin")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

pub async fn count_vehicles(conn: &mut SqliteConnection) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vehicles")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

pub async fn count_vehicles_for(conn: &mut SqliteConnection, customer_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vehicles WHERE customer_id = ?")
        .bind(customer_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// A pre-VIN-key vehicle that could not be migrated
#[derive(Debug, Clone)]
pub struct QuarantinedVehicle {
    pub source_vehicle_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub legacy_vehicle_id: Option<String>,
    pub year: Option<i64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub color: Option<String>,
    pub plate: Option<String>,
    pub vin: Option<String>,
    pub mileage: Option<i64>,
    pub notes: Option<String>,
    pub reason: VinRejection,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Park a vehicle in `vehicles_legacy_no_vin`; returns `false` when the
/// same source row was already quarantined
pub async fn insert_quarantined(
    conn: &mut SqliteConnection,
    vehicle: &QuarantinedVehicle,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO vehicles_legacy_no_vin (
            source_vehicle_id, customer_id, legacy_vehicle_id, year, make, model, trim,
            color, plate, vin, mileage, notes, reason, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                COALESCE(?, datetime('now')), COALESCE(?, datetime('now')))
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(vehicle.source_vehicle_id)
    .bind(vehicle.customer_id)
    .bind(&vehicle.legacy_vehicle_id)
    .bind(vehicle.year)
    .bind(&vehicle.make)
    .bind(&vehicle.model)
    .bind(&vehicle.trim)
    .bind(&vehicle.color)
    .bind(&vehicle.plate)
    .bind(&vehicle.vin)
    .bind(vehicle.mileage)
    .bind(&vehicle.notes)
    .bind(vehicle.reason.as_str())
    .bind(vehicle.created_at)
    .bind(vehicle.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Quarantined rows per reason
pub async fn quarantine_counts(conn: &mut SqliteConnection) -> Result<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT reason, COUNT(*) FROM vehicles_legacy_no_vin GROUP BY reason ORDER BY reason",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}
