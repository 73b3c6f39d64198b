//! `customer_events` table access

use chrono::{DateTime, Utc};
use crm_common::Result;
use sqlx::{FromRow, SqliteConnection};

/// Source recorded for events imported from calendar exports
pub const CALENDAR_IMPORT_SOURCE: &str = "calendar_import";

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub legacy_event_id: String,
    pub customer_id: Option<i64>,
    pub vehicle_vin: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub legacy_event_id: String,
    pub customer_id: Option<i64>,
    pub vehicle_vin: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub source: String,
}

/// Insert unless an event with the same `legacy_event_id` exists
///
/// Returns `true` when a row was inserted.
pub async fn insert_event_if_absent(conn: &mut SqliteConnection, event: &NewEvent) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO customer_events (
            legacy_event_id, customer_id, vehicle_vin, event_date, title, description, source
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(legacy_event_id) DO NOTHING
        "#,
    )
    .bind(&event.legacy_event_id)
    .bind(event.customer_id)
    .bind(&event.vehicle_vin)
    .bind(event.event_date)
    .bind(&event.title)
    .bind(&event.description)
    .bind(&event.source)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_event(conn: &mut SqliteConnection, legacy_event_id: &str) -> Result<Option<EventRecord>> {
    let record = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, legacy_event_id, customer_id, vehicle_vin, event_date, title, description, source
        FROM customer_events WHERE legacy_event_id = ?
        "#,
    )
    .bind(legacy_event_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(record)
}

pub async fn count_events(conn: &mut SqliteConnection) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customer_events")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}
