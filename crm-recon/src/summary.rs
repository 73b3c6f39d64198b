//! Structured run summary
//!
//! Every operation produces one [`RunSummary`]. Row-level failures are
//! tallied here instead of aborting the batch; the binary prints the
//! summary as JSON on success and on failure.

use crate::synonyms::SYNONYM_SET_VERSION;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Upper bound on sample rows carried in a summary
pub const MAX_SAMPLES: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub operation: String,
    pub status: RunStatus,
    pub processed: u64,
    pub migrated: u64,
    pub skipped: u64,
    pub ambiguous: u64,
    /// Operation-specific tallies
    pub counters: BTreeMap<String, u64>,
    pub samples: Vec<Value>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub synonym_set_version: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            status: RunStatus::Running,
            processed: 0,
            migrated: 0,
            skipped: 0,
            ambiguous: 0,
            counters: BTreeMap::new(),
            samples: Vec::new(),
            warnings: Vec::new(),
            error: None,
            synonym_set_version: SYNONYM_SET_VERSION,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Bump an operation-specific counter
    pub fn incr(&mut self, counter: &str) {
        self.add(counter, 1);
    }

    pub fn add(&mut self, counter: &str, amount: u64) {
        *self.counters.entry(counter.to_string()).or_insert(0) += amount;
    }

    pub fn counter(&self, counter: &str) -> u64 {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    /// Keep a sample row; silently dropped past [`MAX_SAMPLES`]
    pub fn sample(&mut self, sample: Value) {
        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(sample);
        }
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Fold another summary's tallies into this one
    pub fn absorb(&mut self, other: &RunSummary) {
        self.processed += other.processed;
        self.migrated += other.migrated;
        self.skipped += other.skipped;
        self.ambiguous += other.ambiguous;
        for (name, value) in &other.counters {
            self.add(name, *value);
        }
        for sample in &other.samples {
            self.sample(sample.clone());
        }
        self.warnings.extend(other.warnings.iter().cloned());
    }

    pub fn finish_ok(&mut self) {
        self.status = RunStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    pub fn finish_err(&mut self, error: &crm_common::Error) {
        self.status = RunStatus::Failed;
        self.error = Some(error.to_string());
        self.finished_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Pretty JSON for terminal output
    pub fn display_string(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}
