//! Schema introspection helpers
//!
//! Thin wrappers over `sqlite_master` and `pragma_table_info` that work on
//! any attached schema. All helpers take a connection so they can run inside
//! a migration transaction as well as on a pooled connection.

use crate::Result;
use sqlx::SqliteConnection;
use tracing::info;

/// Quote an identifier for interpolation into SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Schema-qualified, quoted table reference (`"legacy"."customers"`)
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// List base table names of a schema in name order (no filtering)
pub async fn table_names(conn: &mut SqliteConnection, schema: &str) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT name FROM {}.sqlite_master WHERE type = 'table' ORDER BY name",
        quote_ident(schema)
    );
    let names: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&mut *conn).await?;
    Ok(names)
}

/// Check if table exists (case-insensitive, like SQLite name resolution)
pub async fn table_exists(conn: &mut SqliteConnection, schema: &str, table: &str) -> Result<bool> {
    let sql = format!(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM {}.sqlite_master
            WHERE type = 'table' AND lower(name) = lower(?)
        )
        "#,
        quote_ident(schema)
    );
    let exists: bool = sqlx::query_scalar(&sql)
        .bind(table)
        .fetch_one(&mut *conn)
        .await?;
    Ok(exists)
}

/// Column names of a table in declaration order
pub async fn table_columns(
    conn: &mut SqliteConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<String>> {
    let columns: Vec<String> =
        sqlx::query_scalar("SELECT name FROM pragma_table_info(?, ?) ORDER BY cid")
            .bind(table)
            .bind(schema)
            .fetch_all(&mut *conn)
            .await?;
    Ok(columns)
}

/// Check if a column exists (case-insensitive)
pub async fn column_exists(
    conn: &mut SqliteConnection,
    schema: &str,
    table: &str,
    column: &str,
) -> Result<bool> {
    let columns = table_columns(conn, schema, table).await?;
    Ok(columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
}

/// Row count of a table
pub async fn count_rows(conn: &mut SqliteConnection, schema: &str, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", qualified(schema, table));
    let count: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *conn).await?;
    Ok(count)
}

/// Add a column to a `main` table unless it already exists
///
/// Returns `true` when the column was added.
pub async fn add_column_if_missing(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<bool> {
    if column_exists(conn, "main", table, column).await? {
        return Ok(false);
    }

    let sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(table),
        quote_ident(column),
        definition
    );

    match sqlx::query(&sql).execute(&mut *conn).await {
        Ok(_) => {
            info!("  ✓ Added {}.{}", table, column);
            Ok(true)
        }
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            info!("  {}.{} added concurrently - skipping", table, column);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("customers"), "\"customers\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
        assert_eq!(qualified("legacy", "Cust"), "\"legacy\".\"Cust\"");
    }

    #[tokio::test]
    async fn test_introspection_on_attached_schema() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        sqlx::query("CREATE TABLE legacy.Clients (ID INTEGER, Name TEXT, Phone TEXT)")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO legacy.Clients VALUES (1, 'Ann', '555'), (2, 'Bo', NULL)")
            .execute(&mut *conn)
            .await
            .unwrap();

        assert!(table_exists(&mut conn, "legacy", "clients").await.unwrap());
        assert!(!table_exists(&mut conn, "main", "clients").await.unwrap());
        assert_eq!(
            table_columns(&mut conn, "legacy", "Clients").await.unwrap(),
            vec!["ID", "Name", "Phone"]
        );
        assert!(column_exists(&mut conn, "legacy", "Clients", "phone").await.unwrap());
        assert_eq!(count_rows(&mut conn, "legacy", "Clients").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_add_column_if_missing_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        sqlx::query("CREATE TABLE customers (id INTEGER PRIMARY KEY)")
            .execute(&mut *conn)
            .await
            .unwrap();

        assert!(add_column_if_missing(&mut conn, "customers", "phone_e164", "TEXT").await.unwrap());
        assert!(!add_column_if_missing(&mut conn, "customers", "phone_e164", "TEXT").await.unwrap());
        assert!(column_exists(&mut conn, "main", "customers", "phone_e164").await.unwrap());
    }
}
