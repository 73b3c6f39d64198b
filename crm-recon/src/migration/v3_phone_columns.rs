//! v3: normalized phone columns on `customers`
//!
//! `phone_raw`, `phone_e164` and `phone_display` are added and backfilled
//! from whichever column carries the legacy phone. The legacy column itself
//! is left as it was.

use crate::context::ReconContext;
use crate::db::customers::{load_phone_columns, update_phone_columns};
use crate::phone::normalize_phone;
use crate::summary::RunSummary;
use crm_common::db::{add_column_if_missing, quote_ident};
use crm_common::{Error, Result};
use tracing::info;

const PHONE_COLUMNS: &[&str] = &["phone_raw", "phone_e164", "phone_display"];

pub async fn apply(ctx: &mut ReconContext, summary: &mut RunSummary) -> Result<()> {
    let legacy_column = ctx.catalog().await?.legacy_phone_column();

    let mut tx = ctx.pool.begin().await?;

    let mut added = 0;
    for column in PHONE_COLUMNS {
        if add_column_if_missing(&mut tx, "customers", column, "TEXT").await? {
            added += 1;
        }
    }
    if added == 0 {
        info!("  All phone columns already exist - skipping column additions");
    }
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_customers_phone_e164 ON customers(phone_e164)")
        .execute(&mut *tx)
        .await?;

    let mut normalized = 0u64;
    let mut invalid = 0u64;
    for mut columns in load_phone_columns(&mut tx, &legacy_column).await? {
        if columns.phone_raw.is_some() || columns.phone_e164.is_some() {
            continue;
        }
        let Some(legacy) = columns.legacy_phone.clone().filter(|p| !p.trim().is_empty()) else {
            continue;
        };

        summary.processed += 1;
        let phone = normalize_phone(&legacy);
        if phone.valid {
            normalized += 1;
        } else {
            invalid += 1;
        }
        columns.phone_raw = Some(phone.raw);
        columns.phone_e164 = phone.e164;
        columns.phone_display = phone.display;
        update_phone_columns(&mut tx, &legacy_column, &columns).await?;
    }
    tx.commit().await?;

    summary.migrated += normalized;
    summary.add("phones_normalized", normalized);
    summary.add("phones_invalid", invalid);
    info!(
        "  ✓ Backfilled phone columns from {}: {} normalized, {} kept raw",
        legacy_column, normalized, invalid
    );

    // Every customer with a legacy phone must now carry phone_raw
    let sql = format!(
        r#"
        SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN phone_raw IS NOT NULL THEN 1 ELSE 0 END), 0)
        FROM customers
        WHERE trim(COALESCE(CAST({} AS TEXT), '')) <> ''
        "#,
        quote_ident(&legacy_column)
    );
    let mut conn = ctx.pool.acquire().await?;
    let (with_legacy, with_raw): (i64, i64) = sqlx::query_as(&sql).fetch_one(&mut *conn).await?;
    if with_legacy != with_raw {
        return Err(Error::Verification {
            table: "customers.phone_raw".to_string(),
            legacy: with_legacy,
            migrated: with_raw,
        });
    }
    Ok(())
}
