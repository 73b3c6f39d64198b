//! Target-schema repositories
//!
//! Every function takes a `&mut SqliteConnection` so callers decide whether
//! it runs on a pooled connection or inside a transaction (`&mut *tx`).

pub mod customers;
pub mod events;
pub mod vehicles;
pub mod vin_cache;
