//! Spreadsheet customer/vehicle import
//!
//! Each row is resolved against the identity index. A matched customer is
//! merged (new non-empty values fill, nothing is blanked); an unmatched row
//! becomes a new customer and is registered in the index at once, so a later
//! row for the same person merges instead of duplicating. A row whose VIN
//! validates also upserts that vehicle with the row's year/make/model/trim
//! recorded as manual overrides.

use super::{is_row_level, row_sample};
use crate::context::ReconContext;
use crate::db::customers::{insert_customer, load_identity_keys, merge_customer, CustomerFields};
use crate::db::vehicles::{load_vin_owners, upsert_vehicle, UpsertOutcome, VehicleFields};
use crate::dealer::{is_dealer, recompute_dealer_flags};
use crate::decode::{DecodedVehicle, ManualOverrides};
use crate::identity::{IdentityIndex, IdentityRecord};
use crate::import::tabular::read_rows;
use crate::migration::require_version;
use crate::phone::normalize_phone_value;
use crate::row::LegacyRow;
use crate::summary::RunSummary;
use crate::synonyms::spreadsheet as col;
use crate::vin::validate_vin;
use crm_common::Result;
use sqlx::SqliteConnection;
use std::path::Path;
use tracing::{debug, info, warn};

/// Schema version the importer writes against
const REQUIRED_VERSION: i32 = 4;

/// Canonical customer values of one spreadsheet row
pub fn customer_fields(row: &LegacyRow) -> CustomerFields {
    let phone = row.get(col::PHONE).map(normalize_phone_value);
    let business_name = row.text(col::BUSINESS_NAME);

    CustomerFields {
        legacy_customer_id: None,
        legacy_client_id: row.text(col::CLIENT_ID),
        legacy_lead_id: row.text(col::LEAD_ID),
        first_name: row.text(col::FIRST_NAME),
        last_name: row.text(col::LAST_NAME),
        is_dealer: is_dealer(business_name.as_deref(), 0),
        business_name,
        company: row.text(col::COMPANY),
        phone_raw: phone.as_ref().map(|p| p.raw.clone()).filter(|raw| !raw.is_empty()),
        phone_e164: phone.as_ref().and_then(|p| p.e164.clone()),
        phone_display: phone.as_ref().filter(|p| p.valid).and_then(|p| p.display.clone()),
        email: row.text(col::EMAIL),
        address1: row.text(col::ADDRESS1),
        address2: row.text(col::ADDRESS2),
        city: row.text(col::CITY),
        state: row.text(col::STATE),
        zip: row.text(col::ZIP),
        country: row.text(col::COUNTRY),
        notes: row.text(col::NOTES),
        tags: row.text(col::TAGS),
        source: row.text(col::SOURCE),
    }
}

/// Identity keys of one spreadsheet row
pub fn identity_record(row: &LegacyRow, fields: &CustomerFields) -> IdentityRecord {
    IdentityRecord {
        legacy_ids: fields.legacy_client_id.iter().cloned().collect(),
        email: fields.email.clone(),
        phone: fields.phone_e164.clone().or_else(|| fields.phone_raw.clone()),
        first_name: fields.first_name.clone(),
        last_name: fields.last_name.clone(),
        full_name: row.text(col::FULL_NAME),
        vin: row.text(col::VIN),
        free_text: [row.text(col::VEHICLE_NOTES), row.text(col::NOTES)]
            .into_iter()
            .flatten()
            .collect(),
    }
}

/// Vehicle values typed into the spreadsheet
fn entered_vehicle(row: &LegacyRow) -> DecodedVehicle {
    DecodedVehicle {
        year: row.int(col::YEAR),
        make: row.text(col::MAKE),
        model: row.text(col::MODEL),
        trim: row.text(col::TRIM),
    }
}

/// Import a customer export
pub async fn import_customers(ctx: &mut ReconContext, path: &Path, summary: &mut RunSummary) -> Result<()> {
    require_version(ctx, REQUIRED_VERSION).await?;
    let rows = read_rows(path)?;
    let phone_column = ctx.catalog().await?.legacy_phone_column();
    let policy = ctx.settings.dealer.policy;

    let mut tx = ctx.pool.begin().await?;
    let mut index = {
        let customers = load_identity_keys(&mut tx, &phone_column).await?;
        let vehicles = load_vin_owners(&mut tx).await?;
        IdentityIndex::build(&customers, &vehicles)
    };

    for (idx, row) in rows.iter().enumerate() {
        summary.processed += 1;
        // Header is line 1
        let line = idx + 2;

        match import_row(&mut tx, row, &mut index, &phone_column, summary).await {
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

    recompute_dealer_flags(&mut tx, policy).await?;
    tx.commit().await?;

    info!(
        "✓ Customer import complete: {} rows, {} created, {} merged, {} skipped",
        summary.processed,
        summary.counter("customers_created"),
        summary.counter("customers_merged"),
        summary.skipped
    );
    Ok(())
}

async fn import_row(
    conn: &mut SqliteConnection,
    row: &LegacyRow,
    index: &mut IdentityIndex,
    phone_column: &str,
    summary: &mut RunSummary,
) -> Result<()> {
    let fields = customer_fields(row);
    let record = identity_record(row, &fields);

    if !record.has_keys() {
        debug!("Row without identity keys skipped");
        summary.skipped += 1;
        summary.incr("rows_without_identity");
        return Ok(());
    }

    let resolution = index.resolve(&record);
    let customer_id = match (resolution.customer_id, resolution.matched_by) {
        (Some(id), Some(matched_by)) => {
            merge_customer(conn, id, &fields, phone_column).await?;
            summary.incr("customers_merged");
            summary.incr(&format!("matched_by_{}", matched_by));
            id
        }
        _ => {
            let id = insert_customer(conn, &fields, phone_column).await?;
            summary.incr("customers_created");
            if resolution.ambiguous {
                summary.ambiguous += 1;
                summary.incr("created_from_ambiguous");
            }
            id
        }
    };
    index.register_customer(customer_id, &record);
    summary.migrated += 1;

    let Some(raw_vin) = row.text(col::VIN) else {
        return Ok(());
    };
    let Some(vin) = validate_vin(&raw_vin) else {
        debug!("Invalid VIN {:?} - vehicle not imported", raw_vin);
        summary.incr("invalid_vins");
        return Ok(());
    };

    let entered = entered_vehicle(row);
    let mut overrides = ManualOverrides::default();
    overrides.record(&entered);

    let mut vehicle = VehicleFields::new(vin.clone(), customer_id);
    vehicle.year = entered.year;
    vehicle.make = entered.make;
    vehicle.model = entered.model;
    vehicle.trim = entered.trim;
    vehicle.color = row.text(col::COLOR);
    vehicle.plate = row.text(col::PLATE);
    vehicle.mileage = row.int(col::ODOMETER);
    vehicle.notes = row.text(col::VEHICLE_NOTES);

    match upsert_vehicle(conn, &vehicle, &overrides).await? {
        UpsertOutcome::Created => summary.incr("vehicles_created"),
        UpsertOutcome::Updated => summary.incr("vehicles_updated"),
    }
    index.register_vehicle(&vin, customer_id);
    Ok(())
}
