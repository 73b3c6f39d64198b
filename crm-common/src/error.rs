//! Common error types for the CRM reconciliation tooling

use thiserror::Error;

/// Common result type for CRM operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared across migrations, importers and the decode cache
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error (provider payloads, override sidecars)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Spreadsheet/CSV reading error
    #[error("Tabular input error: {0}")]
    Tabular(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Expected legacy table or column is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed VIN/phone or missing required identity field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Post-migration row counts disagree
    #[error("Verification failed for {table}: legacy={legacy}, migrated={migrated}")]
    Verification {
        table: String,
        legacy: i64,
        migrated: i64,
    },

    /// VIN decode provider failed and no cached entry could stand in
    #[error("Upstream decode error: {0}")]
    UpstreamDecode(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error must abort a batch run.
    ///
    /// Row-level problems (validation, missing optional data) degrade;
    /// schema-level problems and unverified results do not.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Validation(_) | Error::NotFound(_))
    }
}
