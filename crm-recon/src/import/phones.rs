//! Phone repair pass
//!
//! Re-normalizes every stored customer phone. The legacy phone column wins
//! when it parses, unless it is a zero-filled placeholder and `phone_raw`
//! holds a real number.

use crate::context::ReconContext;
use crate::db::customers::{load_phone_columns, update_phone_columns, PhoneColumns};
use crate::migration::require_version;
use crate::phone::normalize_phone;
use crate::summary::RunSummary;
use crm_common::Result;
use serde_json::json;
use tracing::{debug, info};

const REQUIRED_VERSION: i32 = 4;

/// `phone_raw` values that mean "no phone"
const PLACEHOLDERS: &[&str] = &["null", "none", "n/a", "na", "-", "."];

/// Which stored value a repaired phone was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneSource {
    Legacy,
    Raw,
}

pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    PLACEHOLDERS.contains(&value.as_str())
}

/// A run of six zeros, which also covers an area code followed by seven
pub fn is_zeroish(value: &str) -> bool {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.contains("000000")
}

fn parseable(value: Option<&str>) -> Option<&str> {
    value.filter(|v| normalize_phone(v).valid)
}

/// Pick the value to normalize, or `None` when neither parses
pub fn choose_source(legacy: Option<&str>, raw: Option<&str>) -> Option<(PhoneSource, String)> {
    let legacy = parseable(legacy);
    let raw = parseable(raw.filter(|r| !is_placeholder(r)));

    match (legacy, raw) {
        (Some(l), Some(r)) if is_zeroish(l) && !is_zeroish(r) => Some((PhoneSource::Raw, r.to_string())),
        (Some(l), _) => Some((PhoneSource::Legacy, l.to_string())),
        (None, Some(r)) => Some((PhoneSource::Raw, r.to_string())),
        (None, None) => None,
    }
}

/// Repaired columns for one customer, `None` when nothing parses
pub fn repaired(current: &PhoneColumns) -> Option<PhoneColumns> {
    let (source, value) = choose_source(current.legacy_phone.as_deref(), current.phone_raw.as_deref())?;
    let phone = normalize_phone(&value);

    let phone_raw = match source {
        PhoneSource::Raw => Some(value),
        PhoneSource::Legacy => current
            .phone_raw
            .clone()
            .filter(|r| !is_placeholder(r) && !r.trim().is_empty())
            .or(Some(value)),
    };

    Some(PhoneColumns {
        id: current.id,
        legacy_phone: phone.e164.clone(),
        phone_raw,
        phone_e164: phone.e164,
        phone_display: phone.display,
    })
}

fn unchanged(a: &PhoneColumns, b: &PhoneColumns) -> bool {
    a.legacy_phone == b.legacy_phone
        && a.phone_raw == b.phone_raw
        && a.phone_e164 == b.phone_e164
        && a.phone_display == b.phone_display
}

/// Run the repair over every customer
pub async fn repair_phones(ctx: &mut ReconContext, summary: &mut RunSummary) -> Result<()> {
    require_version(ctx, REQUIRED_VERSION).await?;
    let phone_column = ctx.catalog().await?.legacy_phone_column();

    let mut tx = ctx.pool.begin().await?;

    let placeholder_list = PLACEHOLDERS
        .iter()
        .map(|p| format!("'{}'", p))
        .collect::<Vec<_>>()
        .join(", ");
    let cleared = sqlx::query(&format!(
        "UPDATE customers SET phone_raw = NULL WHERE lower(trim(phone_raw)) IN ({})",
        placeholder_list
    ))
    .execute(&mut *tx)
    .await?
    .rows_affected();
    summary.add("placeholders_cleared", cleared);

    let customers = load_phone_columns(&mut tx, &phone_column).await?;
    for current in &customers {
        summary.processed += 1;

        let has_any = current.legacy_phone.as_deref().is_some_and(|p| !p.trim().is_empty())
            || current.phone_raw.as_deref().is_some_and(|p| !p.trim().is_empty());
        if !has_any {
            summary.incr("without_phone");
            continue;
        }

        let Some(next) = repaired(current) else {
            summary.skipped += 1;
            summary.sample(json!({
                "id": current.id,
                "legacy_phone": current.legacy_phone,
                "phone_raw": current.phone_raw,
            }));
            continue;
        };

        if unchanged(current, &next) {
            summary.incr("unchanged");
            continue;
        }

        debug!("Customer {} phone -> {:?}", current.id, next.phone_e164);
        update_phone_columns(&mut tx, &phone_column, &next).await?;
        summary.migrated += 1;
        summary.incr("updated");
    }
    tx.commit().await?;

    info!(
        "✓ Phone repair complete: {} updated, {} unparseable, {} placeholders cleared",
        summary.counter("updated"),
        summary.skipped,
        cleared
    );
    Ok(())
}
