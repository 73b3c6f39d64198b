//! v4: schema for spreadsheet and calendar imports
//!
//! Adds the import-only customer columns, a unique index on
//! `legacy_client_id`, and the `customer_events` table. Schema only; the
//! importers fill it.

use crate::context::ReconContext;
use crate::summary::RunSummary;
use crm_common::db::{add_column_if_missing, table_exists, TARGET_SCHEMA};
use crm_common::{Error, Result};
use tracing::info;

/// (column, definition) pairs added to `customers`
const CUSTOMER_COLUMNS: &[(&str, &str)] = &[
    ("legacy_client_id", "TEXT"),
    ("legacy_lead_id", "TEXT"),
    ("lead_created_at", "TEXT"),
    ("website", "TEXT"),
    ("company", "TEXT"),
    ("country", "TEXT"),
    ("unsubscribed_email", "BOOLEAN"),
    ("tags", "TEXT"),
    ("source", "TEXT"),
];

const CREATE_CUSTOMER_EVENTS: &str = r#"
    CREATE TABLE IF NOT EXISTS customer_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        legacy_event_id TEXT NOT NULL UNIQUE,
        customer_id INTEGER REFERENCES customers(id) ON DELETE CASCADE,
        vehicle_vin TEXT REFERENCES vehicles(vin) ON DELETE SET NULL,
        event_date TEXT,
        title TEXT,
        description TEXT,
        source TEXT NOT NULL DEFAULT 'calendar_import',
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
"#;

const INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_customers_legacy_client_id ON customers(legacy_client_id)",
    "CREATE INDEX IF NOT EXISTS idx_customer_events_customer_id ON customer_events(customer_id)",
    "CREATE INDEX IF NOT EXISTS idx_customer_events_vehicle_vin ON customer_events(vehicle_vin)",
    "CREATE INDEX IF NOT EXISTS idx_customer_events_event_date ON customer_events(event_date)",
];

pub async fn apply(ctx: &mut ReconContext, summary: &mut RunSummary) -> Result<()> {
    let mut tx = ctx.pool.begin().await?;

    let mut added = 0u64;
    for (column, definition) in CUSTOMER_COLUMNS {
        if add_column_if_missing(&mut tx, "customers", column, definition).await? {
            added += 1;
        }
    }
    info!("  ✓ Added {} import columns to customers", added);

    sqlx::query(CREATE_CUSTOMER_EVENTS).execute(&mut *tx).await?;
    for index in INDEXES {
        sqlx::query(index).execute(&mut *tx).await?;
    }
    info!("  ✓ Created customer_events table with 3 indexes");

    tx.commit().await?;
    summary.add("columns_added", added);

    let mut conn = ctx.pool.acquire().await?;
    if !table_exists(&mut conn, TARGET_SCHEMA, "customer_events").await? {
        return Err(Error::Internal("customer_events missing after migration".to_string()));
    }
    Ok(())
}
