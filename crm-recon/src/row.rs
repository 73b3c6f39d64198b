//! Row accessor over heterogeneous records
//!
//! A [`LegacyRow`] is one record from the legacy database or from a
//! spreadsheet export, keyed by lowercased field name. Values are kept as
//! `serde_json::Value` so SQL rows and CSV rows share one representation.
//!
//! Every lookup takes an ordered list of candidate field names and returns the
//! first one that is present and non-empty.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::collections::HashMap;

/// One heterogeneous record with case-insensitive field lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyRow {
    fields: HashMap<String, Value>,
}

impl LegacyRow {
    /// Build from (field name, value) pairs. Later duplicates (by lowercase
    /// name) do not replace earlier ones.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut fields = HashMap::new();
        for (key, value) in pairs {
            fields
                .entry(key.as_ref().trim().to_lowercase())
                .or_insert(value);
        }
        Self { fields }
    }

    /// Build from a SQLite row, decoding each cell by its storage class
    pub fn from_sqlite_row(row: &SqliteRow) -> crm_common::Result<Self> {
        let mut pairs = Vec::with_capacity(row.columns().len());

        for column in row.columns() {
            let idx = column.ordinal();
            let (is_null, type_name) = {
                let raw = row.try_get_raw(idx)?;
                (raw.is_null(), raw.type_info().name().to_string())
            };

            let value = if is_null {
                Value::Null
            } else {
                match type_name.as_str() {
                    "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(idx)?),
                    "REAL" | "NUMERIC" => Number::from_f64(row.try_get::<f64, _>(idx)?)
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                    "BLOB" => Value::Null,
                    _ => Value::String(row.try_get::<String, _>(idx)?),
                }
            };

            pairs.push((column.name().to_string(), value));
        }

        Ok(Self::from_pairs(pairs))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First present, non-empty value among the candidates
    pub fn get(&self, candidates: &[&str]) -> Option<&Value> {
        candidates
            .iter()
            .filter_map(|name| self.fields.get(&name.to_lowercase()))
            .find(|value| !is_blank(value))
    }

    /// Trimmed text of the first non-empty candidate
    pub fn text(&self, candidates: &[&str]) -> Option<String> {
        self.get(candidates).and_then(value_to_text)
    }

    /// Integer of the first non-empty candidate that parses as one
    ///
    /// Floats and numeric strings are truncated toward zero.
    pub fn int(&self, candidates: &[&str]) -> Option<i64> {
        self.get(candidates).and_then(value_to_int)
    }

    /// Boolean of the first non-empty candidate (`true`, `1`, `yes`)
    pub fn bool(&self, candidates: &[&str]) -> Option<bool> {
        self.get(candidates).map(|value| match value {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "y"),
            _ => false,
        })
    }

    /// Timestamp of the first non-empty candidate that parses as a date
    pub fn date(&self, candidates: &[&str]) -> Option<DateTime<Utc>> {
        self.get(candidates)
            .and_then(value_to_text)
            .and_then(|text| parse_timestamp(&text))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Render a cell as trimmed text (integral floats lose their `.0`)
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 && f.abs() < 1e15 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn value_to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.replace(',', "").parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Parse the timestamp formats seen in legacy data and exports
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%m/%d/%Y %I:%M %p",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"];
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    None
}
