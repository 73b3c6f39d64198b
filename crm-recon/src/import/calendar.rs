//! Calendar export import
//!
//! Each calendar entry becomes a `customer_events` row linked, when
//! possible, to a vehicle (VIN found anywhere in the entry) or a customer
//! (phone, then name). Entries that match nothing are kept unlinked.
//! Re-importing the same export inserts nothing: every event carries a
//! stable `legacy_event_id`.

use super::{is_row_level, row_sample};
use crate::context::ReconContext;
use crate::db::customers::load_identity_keys;
use crate::db::events::{insert_event_if_absent, NewEvent, CALENDAR_IMPORT_SOURCE};
use crate::db::vehicles::load_vin_owners;
use crate::identity::{IdentityIndex, IdentityRecord, Resolution};
use crate::import::tabular::read_rows;
use crate::migration::require_version;
use crate::phone::normalize_phone;
use crate::row::LegacyRow;
use crate::summary::RunSummary;
use crate::synonyms::calendar as col;
use chrono::{DateTime, SecondsFormat, Utc};
use crm_common::Result;
use sha2::{Digest, Sha256};
use sqlx::SqliteConnection;
use std::path::Path;
use tracing::{debug, info, warn};

const REQUIRED_VERSION: i32 = 4;

/// The fields of one calendar entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalendarEntry {
    pub event_date: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub explicit_id: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub vin: Option<String>,
    pub services: Option<String>,
    pub other_text: Vec<String>,
}

impl CalendarEntry {
    pub fn from_row(row: &LegacyRow) -> Self {
        Self {
            event_date: row.date(col::DATE),
            title: row.text(col::TITLE),
            description: row.text(col::DESCRIPTION),
            explicit_id: row.text(col::EVENT_ID),
            phone: row.text(col::PHONE),
            name: row.text(col::NAME),
            vin: row.text(col::VIN),
            services: row.text(col::SERVICES),
            other_text: col::OTHER_TEXT
                .iter()
                .filter_map(|&field| row.text(&[field]))
                .collect(),
        }
    }

    /// Entries without date, title and description carry nothing to import
    pub fn is_blank(&self) -> bool {
        self.event_date.is_none() && self.title.is_none() && self.description.is_none()
    }

    fn phone_e164(&self) -> Option<String> {
        self.phone.as_deref().and_then(|p| normalize_phone(p).e164)
    }

    /// Stable id: the export's own id, else a digest of the entry
    pub fn legacy_event_id(&self) -> String {
        if let Some(id) = &self.explicit_id {
            return id.clone();
        }
        deterministic_event_id(
            self.event_date.as_ref(),
            self.title.as_deref(),
            self.phone_e164().as_deref(),
            self.name.as_deref(),
        )
    }

    /// Identity keys, with VIN sweep order: VIN field, title, description,
    /// services, other text
    pub fn identity_record(&self) -> IdentityRecord {
        let free_text = [&self.title, &self.description, &self.services]
            .into_iter()
            .flatten()
            .cloned()
            .chain(self.other_text.iter().cloned())
            .collect();

        IdentityRecord {
            phone: self.phone.clone(),
            // The title often is the customer's name when no name column exists
            full_name: self.name.clone().or_else(|| self.title.clone()),
            vin: self.vin.clone(),
            free_text,
            ..Default::default()
        }
    }
}

/// SHA-256 hex of `date|title|e164|name`, date in millisecond UTC form
pub fn deterministic_event_id(
    event_date: Option<&DateTime<Utc>>,
    title: Option<&str>,
    phone_e164: Option<&str>,
    name: Option<&str>,
) -> String {
    let date = event_date
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default();
    let material = format!(
        "{}|{}|{}|{}",
        date,
        title.unwrap_or(""),
        phone_e164.unwrap_or(""),
        name.unwrap_or("")
    );

    let digest = Sha256::digest(material.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Import a calendar export
pub async fn import_events(ctx: &mut ReconContext, path: &Path, summary: &mut RunSummary) -> Result<()> {
    require_version(ctx, REQUIRED_VERSION).await?;
    let rows = read_rows(path)?;
    let phone_column = ctx.catalog().await?.legacy_phone_column();

    let mut tx = ctx.pool.begin().await?;
    let index = {
        let customers = load_identity_keys(&mut tx, &phone_column).await?;
        let vehicles = load_vin_owners(&mut tx).await?;
        IdentityIndex::build(&customers, &vehicles)
    };

    for (idx, row) in rows.iter().enumerate() {
        summary.processed += 1;
        let line = idx + 2;

        let entry = CalendarEntry::from_row(row);
        if entry.is_blank() {
            summary.skipped += 1;
            summary.incr("blank_rows");
            continue;
        }

        match import_entry(&mut tx, &entry, &index, summary).await {
            Ok(()) => {}
            Err(e) if is_row_level(&e) => {
                warn!("Row {} skipped: {}", line, e);
                summary.skipped += 1;
                summary.incr("row_errors");
                summary.sample(row_sample(line, &e));
            }
            Err(e) => return Err(e),
        }
    }
    tx.commit().await?;

    info!(
        "✓ Calendar import complete: {} imported ({} vehicle, {} customer only, {} unlinked), {} duplicates",
        summary.counter("events_imported"),
        summary.counter("linked_to_vehicle"),
        summary.counter("linked_to_customer_only"),
        summary.counter("unlinked_events"),
        summary.counter("duplicates_skipped")
    );
    Ok(())
}

async fn import_entry(
    conn: &mut SqliteConnection,
    entry: &CalendarEntry,
    index: &IdentityIndex,
    summary: &mut RunSummary,
) -> Result<()> {
    let resolution: Resolution = index.resolve(&entry.identity_record());
    if resolution.ambiguous {
        summary.ambiguous += 1;
    }

    let event = NewEvent {
        legacy_event_id: entry.legacy_event_id(),
        customer_id: resolution.customer_id,
        vehicle_vin: resolution.vehicle_vin.clone(),
        event_date: entry.event_date,
        title: entry.title.clone(),
        description: entry.description.clone(),
        source: CALENDAR_IMPORT_SOURCE.to_string(),
    };

    if !insert_event_if_absent(conn, &event).await? {
        debug!("Event {} already imported", event.legacy_event_id);
        summary.incr("duplicates_skipped");
        return Ok(());
    }

    summary.migrated += 1;
    summary.incr("events_imported");
    if event.vehicle_vin.is_some() {
        summary.incr("linked_to_vehicle");
    } else if event.customer_id.is_some() {
        summary.incr("linked_to_customer_only");
    } else {
        summary.incr("unlinked_events");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_deterministic_id_is_stable_hex() {
        let date = Utc.with_ymd_and_hms(2025, 3, 4, 9, 30, 0).unwrap();
        let a = deterministic_event_id(Some(&date), Some("Tint"), Some("+15551234567"), Some("Ada"));
        let b = deterministic_event_id(Some(&date), Some("Tint"), Some("+15551234567"), Some("Ada"));
        let c = deterministic_event_id(Some(&date), Some("Tint"), None, Some("Ada"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_deterministic_id_of_empty_material() {
        // SHA-256 of "|||"
        let digest = deterministic_event_id(None, None, None, None);
        let expected: String = Sha256::digest(b"|||")
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        assert_eq!(digest, expected);
    }

    #[test]
    fn test_entry_from_row() {
        let row = LegacyRow::from_pairs([
            ("Start", json!("2025-03-04 09:30:00")),
            ("Subject", json!("Ceramic coat")),
            ("Description", json!("Customer car VIN: 1HGCM82633A004352")),
            ("Customer Phone", json!("555.123.4567")),
            ("Location", json!("Bay 2")),
        ]);
        let entry = CalendarEntry::from_row(&row);

        assert!(!entry.is_blank());
        assert_eq!(entry.title.as_deref(), Some("Ceramic coat"));
        assert_eq!(entry.other_text, vec!["Bay 2".to_string()]);
        assert_eq!(entry.legacy_event_id().len(), 64);

        let record = entry.identity_record();
        assert_eq!(record.full_name.as_deref(), Some("Ceramic coat"));
        assert_eq!(
            record.vin_sweep().first().map(|v| v.as_str().to_string()),
            Some("1HGCM82633A004352".to_string())
        );
    }

    #[test]
    fn test_explicit_event_id_wins() {
        let row = LegacyRow::from_pairs([("Event ID", json!("evt-9")), ("Title", json!("Wrap"))]);
        assert_eq!(CalendarEntry::from_row(&row).legacy_event_id(), "evt-9");
    }

    #[test]
    fn test_blank_entry() {
        let row = LegacyRow::from_pairs([("Phone", json!("5551234567")), ("Title", json!("  "))]);
        assert!(CalendarEntry::from_row(&row).is_blank());
    }
}
