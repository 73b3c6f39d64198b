//! `vin_decode_cache` table access

use chrono::{DateTime, Utc};
use crm_common::Result;
use serde_json::Value;
use sqlx::{FromRow, SqliteConnection};

/// One cached provider payload
#[derive(Debug, Clone, FromRow)]
pub struct VinCacheEntry {
    pub vin: String,
    pub decoded_at: DateTime<Utc>,
    pub decoded_source: String,
    pub result_json: sqlx::types::Json<Value>,
}

pub async fn get_entry(conn: &mut SqliteConnection, vin: &str) -> Result<Option<VinCacheEntry>> {
    let entry = sqlx::query_as::<_, VinCacheEntry>(
        "SELECT vin, decoded_at, decoded_source, result_json FROM vin_decode_cache WHERE vin = ?",
    )
    .bind(vin)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(entry)
}

/// Insert or refresh the entry for a VIN
pub async fn upsert_entry(
    conn: &mut SqliteConnection,
    vin: &str,
    decoded_at: DateTime<Utc>,
    source: &str,
    payload: &Value,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO vin_decode_cache (vin, decoded_at, decoded_source, result_json)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(vin) DO UPDATE SET
            decoded_at = excluded.decoded_at,
            decoded_source = excluded.decoded_source,
            result_json = excluded.result_json
        "#,
    )
    .bind(vin)
    .bind(decoded_at)
    .bind(source)
    .bind(sqlx::types::Json(payload))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn count_entries(conn: &mut SqliteConnection) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vin_decode_cache")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}
