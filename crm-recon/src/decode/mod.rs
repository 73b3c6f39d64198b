//! VIN decoding: provider client, cache and vehicle projection

pub mod cache;
pub mod projection;
pub mod provider;

pub use cache::{DecodeOutcome, VinDecodeCache};
pub use projection::{DecodedVehicle, ManualOverrides};
pub use provider::{DecodeError, DecodeProvider, NhtsaVpicClient};
