//! Shared fixtures for crm-recon integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use crm_common::config::Settings;
use crm_recon::decode::{DecodeError, DecodeProvider};
use crm_recon::migration::run_pending;
use crm_recon::{ReconContext, RunSummary};
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

pub const ACCORD_VIN: &str = "1HGCM82633A004352";
pub const CIVIC_VIN: &str = "2HGFA16598H500001";

/// Legacy schema shaped like the shop's old CRM
pub const LEGACY_SCHEMA_SQL: &[&str] = &[
    r#"CREATE TABLE customers (
        id INTEGER PRIMARY KEY,
        name TEXT,
        phone TEXT,
        email TEXT,
        company TEXT,
        notes TEXT,
        created_at TEXT
    )"#,
    r#"CREATE TABLE vehicles (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER,
        year INTEGER,
        make TEXT,
        model TEXT,
        vin TEXT,
        plate TEXT
    )"#,
];

/// Create a legacy database file and run `statements` against it
pub async fn legacy_database(dir: &Path, statements: &[&str]) -> PathBuf {
    let path = dir.join("legacy.db");
    let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await.unwrap();

    for sql in LEGACY_SCHEMA_SQL.iter().chain(statements) {
        sqlx::query(sql).execute(&pool).await.unwrap();
    }
    pool.close().await;
    path
}

/// Open a context on `crm.db` in `dir`, with the legacy database attached
pub async fn open_context(dir: &TempDir, legacy: Option<&Path>) -> ReconContext {
    let settings = Settings {
        database: dir.path().join("crm.db"),
        legacy_database: legacy.map(Path::to_path_buf),
        ..Default::default()
    };
    ReconContext::open(settings).await.unwrap()
}

/// A context with every migration applied and no legacy data
pub async fn migrated_context(dir: &TempDir) -> ReconContext {
    let mut ctx = open_context(dir, None).await;
    let mut summary = RunSummary::new("migrate");
    run_pending(&mut ctx, &mut summary).await.unwrap();
    ctx
}

/// Write a CSV export into `dir`
pub fn write_csv(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Minimal vPIC-shaped payload
pub fn vpic_payload(year: &str, make: &str, model: &str) -> Value {
    json!({
        "Count": 1,
        "Message": "Results returned successfully",
        "Results": [{ "ModelYear": year, "Make": make, "Model": model, "Trim": "" }]
    })
}

/// Decode provider returning a fixed payload, with a call counter and an
/// outage switch
pub struct MockProvider {
    payload: Value,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MockProvider {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl DecodeProvider for MockProvider {
    async fn decode(&self, _vin: &str) -> Result<Value, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DecodeError::NetworkError("provider unreachable".to_string()));
        }
        Ok(self.payload.clone())
    }
}
