//! # CRM Common Library
//!
//! Shared code for the CRM reconciliation tooling including:
//! - Error taxonomy shared by migrations, importers and the decode cache
//! - Configuration loading (CLI → ENV → TOML → compiled defaults)
//! - Database initialization (target database + attached legacy schema)
//! - Schema version bookkeeping and table/column introspection

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
