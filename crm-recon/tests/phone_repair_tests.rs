//! Phone repair pass over stored customers

mod helpers;

use crm_recon::db::customers::get_customer;
use crm_recon::import::repair_phones;
use crm_recon::RunSummary;
use helpers::migrated_context;
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn test_repair_prefers_real_numbers() {
    let dir = TempDir::new().unwrap();
    let mut ctx = migrated_context(&dir).await;
    sqlx::query(
        "INSERT INTO customers (id, first_name, phone, phone_raw, phone_e164, phone_display) VALUES
            (1, 'Ada', '5551234567', NULL, NULL, NULL),
            (2, 'Grace', '5550000000', '555-765-4321', NULL, NULL),
            (3, 'Alan', 'call me', 'N/A', NULL, NULL),
            (4, 'Edsger', '+15559998888', '+15559998888', '+15559998888', '555-999-8888'),
            (5, 'Barbara', NULL, NULL, NULL, NULL)",
    )
    .execute(&ctx.pool)
    .await
    .unwrap();

    let mut summary = RunSummary::new("fix-phones");
    repair_phones(&mut ctx, &mut summary).await.unwrap();

    assert_eq!(summary.processed, 5);
    assert_eq!(summary.counter("placeholders_cleared"), 1);
    assert_eq!(summary.counter("updated"), 2);
    assert_eq!(summary.counter("unchanged"), 1);
    assert_eq!(summary.counter("without_phone"), 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        summary.samples,
        vec![json!({ "id": 3, "legacy_phone": "call me", "phone_raw": null })]
    );

    let mut conn = ctx.pool.acquire().await.unwrap();
    let ada = get_customer(&mut conn, 1).await.unwrap().unwrap();
    assert_eq!(ada.phone.as_deref(), Some("+15551234567"));
    assert_eq!(ada.phone_raw.as_deref(), Some("5551234567"));
    assert_eq!(ada.phone_display.as_deref(), Some("555-123-4567"));

    let grace = get_customer(&mut conn, 2).await.unwrap().unwrap();
    assert_eq!(grace.phone.as_deref(), Some("+15557654321"));
    assert_eq!(grace.phone_e164.as_deref(), Some("+15557654321"));
    assert_eq!(grace.phone_raw.as_deref(), Some("555-765-4321"));

    let alan = get_customer(&mut conn, 3).await.unwrap().unwrap();
    assert_eq!(alan.phone.as_deref(), Some("call me"));
    assert_eq!(alan.phone_raw, None);
    drop(conn);

    let mut again = RunSummary::new("fix-phones");
    repair_phones(&mut ctx, &mut again).await.unwrap();
    assert_eq!(again.counter("updated"), 0);
    assert_eq!(again.counter("unchanged"), 3);
}
