//! Database initialization against on-disk files

use crm_common::db::{current_version, init_database, table_exists, LEGACY_SCHEMA};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("crm.db");

    let pool = init_database(&db_path, None).await.unwrap();

    assert!(db_path.exists(), "Database file was not created");
    assert_eq!(current_version(&pool).await.unwrap(), 0);
    pool.close().await;
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crm.db");

    let pool1 = init_database(&db_path, None).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path, None).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_legacy_database_is_attached_on_every_connection() {
    let dir = TempDir::new().unwrap();
    let legacy_path = dir.path().join("legacy.db");

    // Build a legacy database with one table
    let legacy_pool = init_database(&legacy_path, None).await.unwrap();
    sqlx::query("CREATE TABLE tblCustomers (CustomerID INTEGER, Name TEXT)")
        .execute(&legacy_pool)
        .await
        .unwrap();
    legacy_pool.close().await;

    let pool = init_database(&dir.path().join("crm.db"), Some(&legacy_path))
        .await
        .unwrap();

    // Hold several connections at once: each must see the attached schema
    let mut held = Vec::new();
    for _ in 0..3 {
        let mut conn = pool.acquire().await.unwrap();
        assert!(table_exists(&mut conn, LEGACY_SCHEMA, "tblcustomers").await.unwrap());
        held.push(conn);
    }
    drop(held);
    pool.close().await;
}
