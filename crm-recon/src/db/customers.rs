//! `customers` table access (post-migration schema)

use chrono::{DateTime, Utc};
use crm_common::db::quote_ident;
use crm_common::Result;
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};

/// Column holding the legacy phone copy when none of the synonyms is found
pub const DEFAULT_LEGACY_PHONE_COLUMN: &str = "phone";

/// Canonical customer values produced by an importer
///
/// `None` means "no value in this record": inserts store NULL, merges keep
/// whatever the customer already has.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerFields {
    pub legacy_customer_id: Option<String>,
    pub legacy_client_id: Option<String>,
    pub legacy_lead_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub business_name: Option<String>,
    pub company: Option<String>,
    pub phone_raw: Option<String>,
    pub phone_e164: Option<String>,
    pub phone_display: Option<String>,
    pub email: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<String>,
    pub source: Option<String>,
    pub is_dealer: bool,
}

/// Stored customer row
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CustomerRecord {
    pub id: i64,
    pub legacy_customer_id: Option<String>,
    pub legacy_client_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub business_name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub phone_raw: Option<String>,
    pub phone_e164: Option<String>,
    pub phone_display: Option<String>,
    pub email: Option<String>,
    pub address1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<String>,
    pub source: Option<String>,
    pub is_dealer: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity keys of one customer, as loaded for the identity index
#[derive(Debug, Clone, FromRow)]
pub struct CustomerKeys {
    pub id: i64,
    pub legacy_customer_id: Option<String>,
    pub legacy_client_id: Option<String>,
    pub email: Option<String>,
    pub legacy_phone: Option<String>,
    pub phone_e164: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Insert a customer and return its id
pub async fn insert_customer(
    conn: &mut SqliteConnection,
    fields: &CustomerFields,
    legacy_phone_column: &str,
) -> Result<i64> {
    let sql = format!(
        r#"
        INSERT INTO customers (
            legacy_customer_id, legacy_client_id, legacy_lead_id,
            first_name, last_name, business_name, company,
            {phone}, phone_raw, phone_e164, phone_display, email,
            address1, address2, city, state, zip, country,
            notes, tags, source, is_dealer
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        phone = quote_ident(legacy_phone_column)
    );

    let result = sqlx::query(&sql)
        .bind(&fields.legacy_customer_id)
        .bind(&fields.legacy_client_id)
        .bind(&fields.legacy_lead_id)
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.business_name)
        .bind(&fields.company)
        // legacy phone column carries the normalized value once known
        .bind(fields.phone_e164.as_ref().or(fields.phone_raw.as_ref()))
        .bind(&fields.phone_raw)
        .bind(&fields.phone_e164)
        .bind(&fields.phone_display)
        .bind(&fields.email)
        .bind(&fields.address1)
        .bind(&fields.address2)
        .bind(&fields.city)
        .bind(&fields.state)
        .bind(&fields.zip)
        .bind(&fields.country)
        .bind(&fields.notes)
        .bind(&fields.tags)
        .bind(&fields.source)
        .bind(fields.is_dealer)
        .execute(&mut *conn)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Merge incoming values into an existing customer
///
/// New non-empty values fill or replace; missing values never blank out
/// what is stored. Legacy identifiers are only filled when absent. The
/// dealer flag is only ever raised here.
pub async fn merge_customer(
    conn: &mut SqliteConnection,
    id: i64,
    fields: &CustomerFields,
    legacy_phone_column: &str,
) -> Result<bool> {
    let phone = quote_ident(legacy_phone_column);
    let sql = format!(
        r#"
        UPDATE customers SET
            legacy_customer_id = COALESCE(legacy_customer_id, NULLIF(?, '')),
            legacy_client_id = COALESCE(legacy_client_id, NULLIF(?, '')),
            legacy_lead_id = COALESCE(legacy_lead_id, NULLIF(?, '')),
            first_name = COALESCE(NULLIF(?, ''), first_name),
            last_name = COALESCE(NULLIF(?, ''), last_name),
            business_name = COALESCE(NULLIF(?, ''), business_name),
            company = COALESCE(NULLIF(?, ''), company),
            {phone} = COALESCE(NULLIF(?, ''), {phone}),
            phone_raw = COALESCE(NULLIF(?, ''), phone_raw),
            phone_e164 = COALESCE(NULLIF(?, ''), phone_e164),
            phone_display = COALESCE(NULLIF(?, ''), phone_display),
            email = COALESCE(NULLIF(?, ''), email),
            address1 = COALESCE(NULLIF(?, ''), address1),
            address2 = COALESCE(NULLIF(?, ''), address2),
            city = COALESCE(NULLIF(?, ''), city),
            state = COALESCE(NULLIF(?, ''), state),
            zip = COALESCE(NULLIF(?, ''), zip),
            country = COALESCE(NULLIF(?, ''), country),
            notes = COALESCE(NULLIF(?, ''), notes),
            tags = COALESCE(NULLIF(?, ''), tags),
            source = COALESCE(NULLIF(?, ''), source),
            is_dealer = CASE WHEN ? THEN 1 ELSE is_dealer END,
            updated_at = datetime('now')
        WHERE id = ?
        "#
    );

    let result = sqlx::query(&sql)
        .bind(&fields.legacy_customer_id)
        .bind(&fields.legacy_client_id)
        .bind(&fields.legacy_lead_id)
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.business_name)
        .bind(&fields.company)
        .bind(&fields.phone_e164)
        .bind(&fields.phone_raw)
        .bind(&fields.phone_e164)
        .bind(&fields.phone_display)
        .bind(&fields.email)
        .bind(&fields.address1)
        .bind(&fields.address2)
        .bind(&fields.city)
        .bind(&fields.state)
        .bind(&fields.zip)
        .bind(&fields.country)
        .bind(&fields.notes)
        .bind(&fields.tags)
        .bind(&fields.source)
        .bind(fields.is_dealer)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_customer(conn: &mut SqliteConnection, id: i64) -> Result<Option<CustomerRecord>> {
    let record = sqlx::query_as::<_, CustomerRecord>(
        r#"
        SELECT id, legacy_customer_id, legacy_client_id, first_name, last_name,
               business_name, company, phone, phone_raw, phone_e164, phone_display,
               email, address1, city, state, zip, notes, tags, source, is_dealer,
               created_at, updated_at
        FROM customers WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(record)
}

/// Identity keys of every customer, for building the identity index
pub async fn load_identity_keys(
    conn: &mut SqliteConnection,
    legacy_phone_column: &str,
) -> Result<Vec<CustomerKeys>> {
    let sql = format!(
        r#"
        SELECT id, legacy_customer_id, legacy_client_id, email,
               CAST({} AS TEXT) AS legacy_phone, phone_e164, first_name, last_name
        FROM customers
        ORDER BY id
        "#,
        quote_ident(legacy_phone_column)
    );

    let keys = sqlx::query_as::<_, CustomerKeys>(&sql)
        .fetch_all(&mut *conn)
        .await?;
    Ok(keys)
}

pub async fn count_customers(conn: &mut SqliteConnection) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Phone columns of one customer, as seen by the repair pass
#[derive(Debug, Clone, FromRow)]
pub struct PhoneColumns {
    pub id: i64,
    pub legacy_phone: Option<String>,
    pub phone_raw: Option<String>,
    pub phone_e164: Option<String>,
    pub phone_display: Option<String>,
}

pub async fn load_phone_columns(
    conn: &mut SqliteConnection,
    legacy_phone_column: &str,
) -> Result<Vec<PhoneColumns>> {
    let sql = format!(
        r#"
        SELECT id, CAST({} AS TEXT) AS legacy_phone, phone_raw, phone_e164, phone_display
        FROM customers
        ORDER BY id
        "#,
        quote_ident(legacy_phone_column)
    );

    let rows = sqlx::query_as::<_, PhoneColumns>(&sql)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

/// Overwrite the phone columns of one customer
pub async fn update_phone_columns(
    conn: &mut SqliteConnection,
    legacy_phone_column: &str,
    columns: &PhoneColumns,
) -> Result<()> {
    let sql = format!(
        r#"
        UPDATE customers SET
            {} = ?, phone_raw = ?, phone_e164 = ?, phone_display = ?,
            updated_at = datetime('now')
        WHERE id = ?
        "#,
        quote_ident(legacy_phone_column)
    );

    sqlx::query(&sql)
        .bind(&columns.legacy_phone)
        .bind(&columns.phone_raw)
        .bind(&columns.phone_e164)
        .bind(&columns.phone_display)
        .bind(columns.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
