//! Dealer classification
//!
//! A customer is a dealer when it carries a business name or owns at least
//! [`DEALER_VEHICLE_THRESHOLD`] vehicles. Flags are recomputed by importers
//! and migrations, never by a trigger.

use crm_common::config::DealerPolicy;
use crm_common::Result;
use sqlx::SqliteConnection;
use tracing::info;

/// Vehicle count at which a customer is treated as a dealer
pub const DEALER_VEHICLE_THRESHOLD: i64 = 10;

/// Classify one customer
pub fn is_dealer(business_name: Option<&str>, vehicle_count: i64) -> bool {
    let has_business_name = business_name.map(|b| !b.trim().is_empty()).unwrap_or(false);
    has_business_name || vehicle_count >= DEALER_VEHICLE_THRESHOLD
}

const CLASSIFIER_SQL: &str = r#"
    (COALESCE(trim(business_name), '') <> ''
     OR id IN (
        SELECT customer_id FROM vehicles
        GROUP BY customer_id
        HAVING COUNT(*) >= ?
     ))
"#;

/// Recompute `customers.is_dealer` from current vehicle counts
///
/// With [`DealerPolicy::SetOnly`] flags are only ever raised; with
/// [`DealerPolicy::Recompute`] stale flags are cleared too. Returns the
/// number of customers whose flag changed.
pub async fn recompute_dealer_flags(conn: &mut SqliteConnection, policy: DealerPolicy) -> Result<u64> {
    let sql = match policy {
        DealerPolicy::SetOnly => format!(
            "UPDATE customers SET is_dealer = 1, updated_at = datetime('now') \
             WHERE is_dealer = 0 AND {CLASSIFIER_SQL}"
        ),
        DealerPolicy::Recompute => format!(
            "UPDATE customers SET is_dealer = (CASE WHEN {CLASSIFIER_SQL} THEN 1 ELSE 0 END), \
             updated_at = datetime('now') \
             WHERE is_dealer <> (CASE WHEN {CLASSIFIER_SQL} THEN 1 ELSE 0 END)"
        ),
    };

    let mut query = sqlx::query(&sql).bind(DEALER_VEHICLE_THRESHOLD);
    if policy == DealerPolicy::Recompute {
        query = query.bind(DEALER_VEHICLE_THRESHOLD);
    }
    let changed = query.execute(&mut *conn).await?.rows_affected();

    info!("  ✓ Dealer flags recomputed ({:?}): {} changed", policy, changed);
    Ok(changed)
}
