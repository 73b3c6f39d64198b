//! Calendar export import: linking and re-import

mod helpers;

use chrono::{TimeZone, Utc};
use crm_recon::db::events::{count_events, get_event};
use crm_recon::import::calendar::deterministic_event_id;
use crm_recon::import::import_events;
use crm_recon::RunSummary;
use helpers::{migrated_context, write_csv, ACCORD_VIN};
use tempfile::TempDir;

const EXPORT: &str = "Title,Start,Description,Customer Phone,Name\n\
    Tint,2025-03-04 09:30:00,Front windows VIN: 1HGCM82633A004352,,\n\
    Detail,2025-03-05 10:00:00,Full detail,555.123.4567,\n\
    Wash,2025-03-06 11:00:00,,,Grace Hopper\n\
    Coating,2025-03-07 12:00:00,Walk-in,,Nobody Known\n\
    ,,,,\n\
    Detail,2025-03-05 10:00:00,Full detail,555.123.4567,\n";

#[tokio::test]
async fn test_events_link_to_vehicles_and_customers() {
    let dir = TempDir::new().unwrap();
    let mut ctx = migrated_context(&dir).await;
    sqlx::query(
        "INSERT INTO customers (id, first_name, last_name, phone_e164) VALUES
            (1, 'Ada', 'Lovelace', '+15551234567'),
            (2, 'Grace', 'Hopper', NULL)",
    )
    .execute(&ctx.pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO vehicles (vin, customer_id, make) VALUES (?, 1, 'Honda')")
        .bind(ACCORD_VIN)
        .execute(&ctx.pool)
        .await
        .unwrap();

    let csv = write_csv(&dir, "calendar.csv", EXPORT);
    let mut summary = RunSummary::new("import-events");
    import_events(&mut ctx, &csv, &mut summary).await.unwrap();

    assert_eq!(summary.processed, 6);
    assert_eq!(summary.counter("events_imported"), 4);
    assert_eq!(summary.counter("linked_to_vehicle"), 1);
    assert_eq!(summary.counter("linked_to_customer_only"), 2);
    assert_eq!(summary.counter("unlinked_events"), 1);
    assert_eq!(summary.counter("duplicates_skipped"), 1);
    assert_eq!(summary.counter("blank_rows"), 1);

    let mut conn = ctx.pool.acquire().await.unwrap();
    assert_eq!(count_events(&mut conn).await.unwrap(), 4);

    let wash_date = Utc.with_ymd_and_hms(2025, 3, 6, 11, 0, 0).unwrap();
    let wash_id = deterministic_event_id(Some(&wash_date), Some("Wash"), None, Some("Grace Hopper"));
    let wash = get_event(&mut conn, &wash_id).await.unwrap().unwrap();
    assert_eq!(wash.customer_id, Some(2));
    assert_eq!(wash.vehicle_vin, None);
    assert_eq!(wash.source, "calendar_import");

    let tint_date = Utc.with_ymd_and_hms(2025, 3, 4, 9, 30, 0).unwrap();
    let tint_id = deterministic_event_id(Some(&tint_date), Some("Tint"), None, None);
    let tint = get_event(&mut conn, &tint_id).await.unwrap().unwrap();
    assert_eq!(tint.customer_id, Some(1));
    assert_eq!(tint.vehicle_vin.as_deref(), Some(ACCORD_VIN));
    assert_eq!(tint.event_date, Some(tint_date));
}

#[tokio::test]
async fn test_reimport_skips_every_event() {
    let dir = TempDir::new().unwrap();
    let mut ctx = migrated_context(&dir).await;
    let csv = write_csv(&dir, "calendar.csv", EXPORT);

    import_events(&mut ctx, &csv, &mut RunSummary::new("import-events"))
        .await
        .unwrap();

    let mut second = RunSummary::new("import-events");
    import_events(&mut ctx, &csv, &mut second).await.unwrap();

    assert_eq!(second.counter("events_imported"), 0);
    assert_eq!(second.counter("duplicates_skipped"), 5);

    let mut conn = ctx.pool.acquire().await.unwrap();
    assert_eq!(count_events(&mut conn).await.unwrap(), 4);
}
