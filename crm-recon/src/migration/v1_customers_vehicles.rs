//! v1: target `customers` and surrogate-keyed `vehicles`, backfilled from the
//! legacy relational schema
//!
//! Legacy tables and columns are discovered by hint. A missing legacy table
//! leaves the target schema empty (degraded run); a missing owner column on
//! the legacy vehicles table skips the vehicle copy.

use super::verify::compare_counts;
use crate::context::ReconContext;
use crate::dealer::is_dealer;
use crate::discovery::snapshot_rows;
use crate::row::LegacyRow;
use crate::summary::RunSummary;
use crate::synonyms::{customer, tables, vehicle};
use chrono::{DateTime, Utc};
use crm_common::db::{count_rows, LEGACY_SCHEMA, TARGET_SCHEMA};
use crm_common::Result;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const CREATE_CUSTOMERS: &str = r#"
    CREATE TABLE IF NOT EXISTS customers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        legacy_customer_id TEXT,
        first_name TEXT,
        last_name TEXT,
        business_name TEXT,
        phone TEXT,
        email TEXT,
        address1 TEXT,
        address2 TEXT,
        city TEXT,
        state TEXT,
        zip TEXT,
        notes TEXT,
        is_dealer BOOLEAN NOT NULL DEFAULT 0,
        dealer_level TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
"#;

const CREATE_VEHICLES: &str = r#"
    CREATE TABLE IF NOT EXISTS vehicles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
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
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
"#;

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_customers_last_name ON customers(last_name)",
    "CREATE INDEX IF NOT EXISTS idx_customers_phone ON customers(phone)",
    "CREATE INDEX IF NOT EXISTS idx_customers_email ON customers(email)",
    "CREATE INDEX IF NOT EXISTS idx_customers_is_dealer ON customers(is_dealer)",
    "CREATE INDEX IF NOT EXISTS idx_customers_legacy_customer_id ON customers(legacy_customer_id)",
    "CREATE INDEX IF NOT EXISTS idx_vehicles_v1_customer_id ON vehicles(customer_id)",
    "CREATE INDEX IF NOT EXISTS idx_vehicles_v1_vin ON vehicles(vin)",
    "CREATE INDEX IF NOT EXISTS idx_vehicles_v1_plate ON vehicles(plate)",
];

/// Legacy tables found for this run
#[derive(Debug, Clone, Default)]
struct LegacySources {
    customers: Option<String>,
    vehicles: Option<String>,
    /// Column of the legacy vehicles table referencing its owner
    owner_column: Option<String>,
}

pub async fn apply(ctx: &mut ReconContext, summary: &mut RunSummary) -> Result<()> {
    let sources = discover(ctx, summary).await?;

    let mut tx = ctx.pool.begin().await?;
    sqlx::query(CREATE_CUSTOMERS).execute(&mut *tx).await?;
    sqlx::query(CREATE_VEHICLES).execute(&mut *tx).await?;
    for index in INDEXES {
        sqlx::query(index).execute(&mut *tx).await?;
    }
    info!("  ✓ Created customers and vehicles tables");

    let legacy_vehicles = match (&sources.vehicles, &sources.owner_column) {
        (Some(table), Some(_)) => snapshot_rows(&mut tx, LEGACY_SCHEMA, table, &["id"]).await?,
        _ => Vec::new(),
    };
    let owner_column = sources.owner_column.as_deref().unwrap_or_default();

    if let Some(table) = &sources.customers {
        if count_rows(&mut tx, TARGET_SCHEMA, "customers").await? == 0 {
            let rows = snapshot_rows(&mut tx, LEGACY_SCHEMA, table, &["id"]).await?;
            let counts = vehicle_counts(&legacy_vehicles, owner_column);
            backfill_customers(&mut tx, &rows, &counts, summary).await?;
        } else {
            info!("  customers already populated - skipping backfill");
        }
    }

    if !legacy_vehicles.is_empty() {
        if count_rows(&mut tx, TARGET_SCHEMA, "vehicles").await? == 0 {
            let owners = customer_id_map(&mut tx).await?;
            backfill_vehicles(&mut tx, &legacy_vehicles, owner_column, &owners, summary).await?;
        } else {
            info!("  vehicles already populated - skipping backfill");
        }
    }

    tx.commit().await?;

    let mut conn = ctx.pool.acquire().await?;
    if sources.customers.is_some() {
        compare_counts(&mut conn, "customers", sources.customers.as_deref(), &["customers"])
            .await?
            .ensure()?;
    }
    if sources.owner_column.is_some() {
        compare_counts(&mut conn, "vehicles", sources.vehicles.as_deref(), &["vehicles"])
            .await?
            .ensure()?;
    }
    info!("  ✓ Customer and vehicle counts verified");
    Ok(())
}

async fn discover(ctx: &mut ReconContext, summary: &mut RunSummary) -> Result<LegacySources> {
    let catalog = ctx.catalog().await?;
    let customers = catalog.find_table(LEGACY_SCHEMA, tables::CUSTOMERS);
    let vehicles = catalog.find_table(LEGACY_SCHEMA, tables::VEHICLES);

    let owner_column = vehicles
        .as_deref()
        .and_then(|table| catalog.find_column(LEGACY_SCHEMA, table, vehicle::OWNER));

    if customers.is_none() {
        let message = "No legacy customer table detected; customers created without copied data";
        warn!("  {}", message);
        summary.warn(message);
    }
    if let (Some(table), None) = (&vehicles, &owner_column) {
        let message = format!(
            "Detected {} but could not find a customer reference column; vehicle copy skipped",
            table
        );
        warn!("  {}", message);
        summary.warn(message);
    }

    Ok(LegacySources {
        customers,
        vehicles,
        owner_column,
    })
}

fn vehicle_counts(vehicles: &[LegacyRow], owner_column: &str) -> HashMap<String, i64> {
    let mut counts = HashMap::new();
    for row in vehicles {
        if let Some(owner) = row.text(&[owner_column]) {
            *counts.entry(owner).or_insert(0) += 1;
        }
    }
    counts
}

/// First token is the first name, the rest is the last name
fn split_name(full: &str) -> (Option<String>, Option<String>) {
    let mut parts = full.split_whitespace();
    let first = parts.next().map(str::to_string);
    let rest: Vec<&str> = parts.collect();
    let last = (!rest.is_empty()).then(|| rest.join(" "));
    (first, last)
}

async fn backfill_customers(
    conn: &mut SqliteConnection,
    rows: &[LegacyRow],
    vehicle_counts: &HashMap<String, i64>,
    summary: &mut RunSummary,
) -> Result<()> {
    let mut inserted = 0u64;

    for row in rows {
        summary.processed += 1;
        let legacy_id = row.text(customer::ID);

        let (split_first, split_last) = row
            .text(customer::FULL_NAME)
            .map(|full| split_name(&full))
            .unwrap_or((None, None));
        let first_name = row.text(customer::FIRST_NAME).or(split_first);
        let last_name = row.text(customer::LAST_NAME).or(split_last);
        let business_name = row.text(customer::BUSINESS_NAME);

        let vehicle_count = legacy_id
            .as_ref()
            .and_then(|id| vehicle_counts.get(id))
            .copied()
            .unwrap_or(0);
        let dealer = row.bool(customer::IS_DEALER).unwrap_or(false)
            || is_dealer(business_name.as_deref(), vehicle_count);

        let created_at: Option<DateTime<Utc>> = row.date(customer::CREATED_AT);
        let updated_at: Option<DateTime<Utc>> = row.date(customer::UPDATED_AT);

        sqlx::query(
            r#"
            INSERT INTO customers (
                legacy_customer_id, first_name, last_name, business_name, phone, email,
                address1, address2, city, state, zip, notes, is_dealer, dealer_level,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                    COALESCE(?, datetime('now')), COALESCE(?, datetime('now')))
            "#,
        )
        .bind(&legacy_id)
        .bind(&first_name)
        .bind(&last_name)
        .bind(&business_name)
        .bind(row.text(customer::PHONE))
        .bind(row.text(customer::EMAIL))
        .bind(row.text(customer::ADDRESS1))
        .bind(row.text(customer::ADDRESS2))
        .bind(row.text(customer::CITY))
        .bind(row.text(customer::STATE))
        .bind(row.text(customer::ZIP))
        .bind(row.text(customer::NOTES))
        .bind(dealer)
        .bind(row.text(customer::DEALER_LEVEL))
        .bind(created_at)
        .bind(updated_at)
        .execute(&mut *conn)
        .await?;

        inserted += 1;
        if dealer {
            summary.incr("dealers");
        }
    }

    summary.migrated += inserted;
    summary.add("customers_migrated", inserted);
    info!("  ✓ Migrated {} customers", inserted);
    Ok(())
}

/// legacy customer id -> target customer id
async fn customer_id_map(conn: &mut SqliteConnection) -> Result<HashMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT legacy_customer_id, id FROM customers WHERE legacy_customer_id IS NOT NULL ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut map = HashMap::with_capacity(rows.len());
    for (legacy_id, id) in rows {
        map.entry(legacy_id).or_insert(id);
    }
    Ok(map)
}

async fn backfill_vehicles(
    conn: &mut SqliteConnection,
    rows: &[LegacyRow],
    owner_column: &str,
    owners: &HashMap<String, i64>,
    summary: &mut RunSummary,
) -> Result<()> {
    let mut inserted = 0u64;
    let mut orphaned = 0u64;

    for row in rows {
        summary.processed += 1;
        let owner = row
            .text(&[owner_column])
            .and_then(|legacy| owners.get(&legacy).copied());
        let Some(customer_id) = owner else {
            debug!("Skipping vehicle {:?}: owner not migrated", row.text(vehicle::ID));
            orphaned += 1;
            continue;
        };

        sqlx::query(
            r#"
            INSERT INTO vehicles (
                customer_id, legacy_vehicle_id, year, make, model, trim, color, plate,
                vin, mileage, notes, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                    COALESCE(?, datetime('now')), COALESCE(?, datetime('now')))
            "#,
        )
        .bind(customer_id)
        .bind(row.text(vehicle::ID))
        .bind(row.int(vehicle::YEAR))
        .bind(row.text(vehicle::MAKE))
        .bind(row.text(vehicle::MODEL))
        .bind(row.text(vehicle::TRIM))
        .bind(row.text(vehicle::COLOR))
        .bind(row.text(vehicle::PLATE))
        .bind(row.text(vehicle::VIN))
        .bind(row.int(vehicle::MILEAGE))
        .bind(row.text(vehicle::NOTES))
        .bind(row.date(vehicle::CREATED_AT))
        .bind(row.date(vehicle::UPDATED_AT))
        .execute(&mut *conn)
        .await?;

        inserted += 1;
    }

    summary.migrated += inserted;
    summary.skipped += orphaned;
    summary.add("vehicles_migrated", inserted);
    summary.add("vehicles_without_owner", orphaned);
    if orphaned > 0 {
        warn!("  {} legacy vehicles skipped: owner not migrated", orphaned);
    }
    info!("  ✓ Migrated {} vehicles", inserted);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_name() {
        assert_eq!(
            split_name("  Mary  Ann Smith "),
            (Some("Mary".to_string()), Some("Ann Smith".to_string()))
        );
        assert_eq!(split_name("Cher"), (Some("Cher".to_string()), None));
        assert_eq!(split_name(""), (None, None));
    }

    #[test]
    fn test_vehicle_counts_by_owner_text() {
        let rows = vec![
            LegacyRow::from_pairs([("CustomerID", json!(7))]),
            LegacyRow::from_pairs([("CustomerID", json!("7"))]),
            LegacyRow::from_pairs([("CustomerID", json!(null))]),
        ];
        let counts = vehicle_counts(&rows, "CustomerID");
        assert_eq!(counts.get("7"), Some(&2));
        assert_eq!(counts.len(), 1);
    }
}
