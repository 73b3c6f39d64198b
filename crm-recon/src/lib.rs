//! crm-recon library interface
//!
//! Reconciles a legacy shop-CRM database and spreadsheet/calendar exports
//! into the normalized customer, vehicle and event tables. The binary is a
//! thin CLI over [`migration`], [`import`] and [`decode`].

pub mod context;
pub mod db;
pub mod dealer;
pub mod decode;
pub mod discovery;
pub mod identity;
pub mod import;
pub mod migration;
pub mod phone;
pub mod row;
pub mod summary;
pub mod synonyms;
pub mod vin;

pub use context::{ReconContext, SchemaCatalog};
pub use identity::{IdentityIndex, IdentityRecord, MatchedBy, Resolution};
pub use phone::{normalize_phone, NormalizedPhone};
pub use summary::{RunStatus, RunSummary};
pub use vin::{validate_vin, Vin};
