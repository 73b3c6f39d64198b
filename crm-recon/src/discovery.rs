//! Legacy schema and column discovery
//!
//! The legacy schema was never documented, so tables and columns are found by
//! hint. Tables match fuzzily (exact name first, then substring) because
//! legacy table names carry prefixes and suffixes (`tblCustomers`,
//! `customers_2019`). Columns match exactly against an ordered synonym list:
//! a substring rule would make `id` hit `customer_id`.

use crate::row::LegacyRow;
use crm_common::db::{qualified, quote_ident, table_columns, table_names};
use crm_common::Result;
use sqlx::SqliteConnection;
use tracing::{debug, warn};

/// Tables that belong to migration bookkeeping, never to legacy data
const IGNORED_TABLES: &[&str] = &["schema_version", "_sqlx_migrations"];

fn is_internal(table: &str) -> bool {
    let lower = table.to_lowercase();
    lower.starts_with("sqlite_") || IGNORED_TABLES.contains(&lower.as_str())
}

/// Base tables of a schema, excluding internal and bookkeeping tables
pub async fn list_tables(conn: &mut SqliteConnection, schema: &str) -> Result<Vec<String>> {
    let tables = table_names(conn, schema).await?;
    Ok(tables.into_iter().filter(|t| !is_internal(t)).collect())
}

/// Pick a table for the given hints
///
/// Exact (case-insensitive) match over all hints first, in hint order; then
/// the first table, in table order, whose name contains any hint.
pub fn match_table_hint(tables: &[String], hints: &[&str]) -> Option<String> {
    let lowered: Vec<String> = tables.iter().map(|t| t.to_lowercase()).collect();
    let hints: Vec<String> = hints.iter().map(|h| h.to_lowercase()).collect();

    for hint in &hints {
        if let Some(idx) = lowered.iter().position(|t| t == hint) {
            return Some(tables[idx].clone());
        }
    }

    let fuzzy = tables
        .iter()
        .zip(&lowered)
        .find(|(_, lower)| hints.iter().any(|hint| lower.contains(hint.as_str())))
        .map(|(table, _)| table.clone());

    if let Some(table) = &fuzzy {
        warn!("Table hint {:?} matched {} by substring", hints, table);
    }
    fuzzy
}

/// Find a table in `schema` by hint (see [`match_table_hint`])
pub async fn find_table_by_hint(
    conn: &mut SqliteConnection,
    schema: &str,
    hints: &[&str],
) -> Result<Option<String>> {
    let tables = list_tables(conn, schema).await?;
    let found = match_table_hint(&tables, hints);
    debug!("Table hint {:?} in {} -> {:?}", hints, schema, found);
    Ok(found)
}

/// Ordered column names of a table
pub async fn fetch_columns(
    conn: &mut SqliteConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<String>> {
    table_columns(conn, schema, table).await
}

/// First candidate that names a column exactly (case-insensitive)
///
/// Returns the column's actual spelling.
pub fn find_column(columns: &[String], candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|candidate| {
        columns
            .iter()
            .find(|column| column.eq_ignore_ascii_case(candidate))
            .cloned()
    })
}

/// Read every row of a table as [`LegacyRow`]s
///
/// `order_by` names columns to sort by; columns the table does not have are
/// dropped from the clause so the query never fails on a missing column.
pub async fn snapshot_rows(
    conn: &mut SqliteConnection,
    schema: &str,
    table: &str,
    order_by: &[&str],
) -> Result<Vec<LegacyRow>> {
    let columns = fetch_columns(conn, schema, table).await?;
    let order: Vec<String> = order_by
        .iter()
        .filter_map(|wanted| find_column(&columns, &[wanted]))
        .map(|column| quote_ident(&column))
        .collect();

    let mut sql = format!("SELECT * FROM {}", qualified(schema, table));
    if !order.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }

    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    rows.iter().map(LegacyRow::from_sqlite_row).collect()
}
