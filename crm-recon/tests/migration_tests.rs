//! Schema migrations end to end against an on-disk legacy database

mod helpers;

use crm_common::db::{applied_versions, column_exists, count_rows, TARGET_SCHEMA};
use crm_common::Error;
use crm_recon::db::customers::get_customer;
use crm_recon::db::vehicles::{get_vehicle, quarantine_counts};
use crm_recon::import::import_customers;
use crm_recon::migration::{run_migration, run_pending, verify};
use crm_recon::RunSummary;
use helpers::{legacy_database, open_context, write_csv, ACCORD_VIN, CIVIC_VIN};
use tempfile::TempDir;

const LEGACY_ROWS: &[&str] = &[
    "INSERT INTO customers (id, name, phone, email, company) VALUES
        (1, 'Ada Lovelace', '(555) 123-4567', 'ada@example.com', NULL),
        (2, 'Grace Hopper', '555.987.6543', NULL, NULL),
        (3, 'Fleet Desk', '123', NULL, 'Fleet Motors LLC')",
    "INSERT INTO vehicles (id, customer_id, year, make, model, vin, plate) VALUES
        (1, 1, 2003, 'Honda', 'Accord', '1hgcm82633a004352', 'ABC123'),
        (2, 2, 1999, 'Ford', 'F-150', NULL, NULL),
        (3, 2, 2001, 'Ford', 'Ranger', 'BADVIN', NULL),
        (4, 3, 2003, 'Honda', 'Accord', '1HGCM82633A004352', NULL),
        (5, 3, 2008, 'Honda', 'Civic', '2HGFA16598H500001', 'FLEET1')",
];

#[tokio::test]
async fn test_full_migration_from_legacy() {
    let dir = TempDir::new().unwrap();
    let legacy = legacy_database(dir.path(), LEGACY_ROWS).await;
    let mut ctx = open_context(&dir, Some(&legacy)).await;

    let mut summary = RunSummary::new("migrate");
    run_pending(&mut ctx, &mut summary).await.unwrap();

    assert_eq!(applied_versions(&ctx.pool).await.unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(summary.counter("customers_migrated"), 3);
    assert_eq!(summary.counter("vehicles_quarantined"), 3);
    assert_eq!(summary.counter("missing_vin"), 1);
    assert_eq!(summary.counter("invalid_vin_format"), 1);
    assert_eq!(summary.counter("duplicate_vin"), 1);

    let mut conn = ctx.pool.acquire().await.unwrap();
    assert_eq!(count_rows(&mut conn, TARGET_SCHEMA, "customers").await.unwrap(), 3);
    assert_eq!(count_rows(&mut conn, TARGET_SCHEMA, "vehicles").await.unwrap(), 2);
    assert_eq!(count_rows(&mut conn, TARGET_SCHEMA, "vehicles_v1").await.unwrap(), 5);

    let mut reasons = quarantine_counts(&mut conn).await.unwrap();
    reasons.sort();
    assert_eq!(
        reasons,
        vec![
            ("duplicate_vin".to_string(), 1),
            ("invalid_vin_format".to_string(), 1),
            ("missing_vin".to_string(), 1),
        ]
    );

    // First occurrence of a duplicated VIN keeps the key
    let accord = get_vehicle(&mut conn, ACCORD_VIN).await.unwrap().unwrap();
    assert_eq!(accord.customer_id, 1);
    assert_eq!(accord.plate.as_deref(), Some("ABC123"));
    let civic = get_vehicle(&mut conn, CIVIC_VIN).await.unwrap().unwrap();
    assert_eq!(civic.customer_id, 3);

    let ada = get_customer(&mut conn, 1).await.unwrap().unwrap();
    assert_eq!(ada.first_name.as_deref(), Some("Ada"));
    assert_eq!(ada.last_name.as_deref(), Some("Lovelace"));
    assert_eq!(ada.phone.as_deref(), Some("(555) 123-4567"));
    assert_eq!(ada.phone_raw.as_deref(), Some("(555) 123-4567"));
    assert_eq!(ada.phone_e164.as_deref(), Some("+15551234567"));
    assert_eq!(ada.phone_display.as_deref(), Some("555-123-4567"));
    assert!(!ada.is_dealer);

    let fleet = get_customer(&mut conn, 3).await.unwrap().unwrap();
    assert!(fleet.is_dealer);
    assert_eq!(fleet.phone_raw.as_deref(), Some("123"));
    assert_eq!(fleet.phone_e164, None);

    assert!(column_exists(&mut conn, TARGET_SCHEMA, "customers", "legacy_client_id").await.unwrap());
    drop(conn);

    let report = verify(&mut ctx).await.unwrap();
    assert!(report.passed(), "{report:?}");
}

#[tokio::test]
async fn test_rerun_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let legacy = legacy_database(dir.path(), LEGACY_ROWS).await;
    let mut ctx = open_context(&dir, Some(&legacy)).await;

    run_pending(&mut ctx, &mut RunSummary::new("migrate")).await.unwrap();

    let mut again = RunSummary::new("migrate");
    run_pending(&mut ctx, &mut again).await.unwrap();
    assert_eq!(again.counter("versions_applied"), 0);

    run_migration(&mut ctx, 2, &mut again).await.unwrap();
    assert_eq!(again.counter("versions_skipped"), 1);

    let mut conn = ctx.pool.acquire().await.unwrap();
    assert_eq!(count_rows(&mut conn, TARGET_SCHEMA, "customers").await.unwrap(), 3);
    assert_eq!(count_rows(&mut conn, TARGET_SCHEMA, "vehicles").await.unwrap(), 2);
}

#[tokio::test]
async fn test_orphaned_legacy_vehicle_fails_verification() {
    let dir = TempDir::new().unwrap();
    let legacy = legacy_database(
        dir.path(),
        &[
            "INSERT INTO customers (id, name) VALUES (1, 'Ada Lovelace')",
            "INSERT INTO vehicles (id, customer_id, vin) VALUES
                (1, 1, '1HGCM82633A004352'),
                (2, 99, '2HGFA16598H500001')",
        ],
    )
    .await;
    let mut ctx = open_context(&dir, Some(&legacy)).await;

    let mut summary = RunSummary::new("migrate");
    let err = run_migration(&mut ctx, 1, &mut summary).await.unwrap_err();
    assert!(err.is_fatal());
    match err {
        Error::Verification { table, legacy, migrated } => {
            assert_eq!(table, "vehicles");
            assert_eq!(legacy, 2);
            assert_eq!(migrated, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // A failed verification never records the version
    assert!(applied_versions(&ctx.pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_legacy_tables_degrade() {
    let dir = TempDir::new().unwrap();
    let mut ctx = open_context(&dir, None).await;

    let mut summary = RunSummary::new("migrate");
    run_pending(&mut ctx, &mut summary).await.unwrap();

    assert!(!summary.warnings.is_empty());
    assert_eq!(applied_versions(&ctx.pool).await.unwrap(), vec![1, 2, 3, 4]);
    assert!(verify(&mut ctx).await.unwrap().passed());
}

#[tokio::test]
async fn test_importer_requires_migrated_schema() {
    let dir = TempDir::new().unwrap();
    let mut ctx = open_context(&dir, None).await;
    let csv = write_csv(&dir, "customers.csv", "Client ID,Email\nC-1,a@example.com\n");

    let mut summary = RunSummary::new("import-customers");
    let err = import_customers(&mut ctx, &csv, &mut summary).await.unwrap_err();
    assert!(err.to_string().contains("run migrate first"));
    assert_eq!(summary.processed, 0);
}
