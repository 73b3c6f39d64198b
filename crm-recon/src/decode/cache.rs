//! TTL-bound cache in front of the VIN decode provider
//!
//! Fresh entries (age within the TTL) are served without a provider call.
//! Anything older, or missing, goes to the provider. When the provider fails,
//! an existing entry of any age is served marked `stale`; only a VIN that was
//! never decoded surfaces the failure.

use super::projection::{DecodedVehicle, ManualOverrides};
use super::provider::DecodeProvider;
use crate::db::{vehicles, vin_cache};
use crate::vin::{validate_vin, Vin};
use chrono::{DateTime, Duration, Utc};
use crm_common::config::DecodeSettings;
use crm_common::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one decode request
#[derive(Debug, Clone, Serialize)]
pub struct DecodeOutcome {
    pub vin: Vin,
    /// Projection of `raw`, with manual overrides layered on when known
    pub parsed: DecodedVehicle,
    pub raw: Value,
    pub decoded_at: DateTime<Utc>,
    pub source: String,
    /// Served from cache without a provider call
    pub cached: bool,
    /// Served from an expired cache entry because the provider failed
    pub stale: bool,
    pub warning: Option<String>,
}

impl DecodeOutcome {
    fn from_entry(vin: Vin, entry: vin_cache::VinCacheEntry, stale: bool, warning: Option<String>) -> Self {
        let raw = entry.result_json.0;
        Self {
            vin,
            parsed: DecodedVehicle::from_payload(&raw),
            raw,
            decoded_at: entry.decoded_at,
            source: entry.decoded_source,
            cached: true,
            stale,
            warning,
        }
    }
}

/// VIN decode cache backed by `vin_decode_cache`
pub struct VinDecodeCache {
    pool: SqlitePool,
    provider: Arc<dyn DecodeProvider>,
    ttl: Duration,
    source: String,
}

impl VinDecodeCache {
    pub fn new(pool: SqlitePool, provider: Arc<dyn DecodeProvider>, settings: &DecodeSettings) -> Self {
        Self {
            pool,
            provider,
            ttl: Duration::days(settings.ttl_days),
            source: settings.source.clone(),
        }
    }

    /// Decode a VIN through the cache
    pub async fn decode(&self, raw_vin: &str) -> Result<DecodeOutcome> {
        let vin = parse_vin(raw_vin)?;

        let cached = {
            let mut conn = self.pool.acquire().await?;
            vin_cache::get_entry(&mut conn, vin.as_str()).await?
        };

        let now = Utc::now();
        if let Some(entry) = &cached {
            let age = now - entry.decoded_at;
            if age <= self.ttl {
                debug!(vin = %vin, age_days = age.num_days(), "VIN decode cache hit");
                return Ok(DecodeOutcome::from_entry(vin, entry.clone(), false, None));
            }
            debug!(vin = %vin, age_days = age.num_days(), "VIN decode cache entry expired");
        }

        match self.provider.decode(vin.as_str()).await {
            Ok(payload) => {
                {
                    let mut conn = self.pool.acquire().await?;
                    vin_cache::upsert_entry(&mut conn, vin.as_str(), now, &self.source, &payload).await?;
                }
                info!(vin = %vin, "✓ Cached VIN decode");
                Ok(DecodeOutcome {
                    parsed: DecodedVehicle::from_payload(&payload),
                    vin,
                    raw: payload,
                    decoded_at: now,
                    source: self.source.clone(),
                    cached: false,
                    stale: false,
                    warning: None,
                })
            }
            Err(e) => match cached {
                Some(entry) => {
                    let warning = format!(
                        "Decode provider failed ({}); serving cached result from {}",
                        e,
                        entry.decoded_at.to_rfc3339()
                    );
                    warn!(vin = %vin, "{}", warning);
                    Ok(DecodeOutcome::from_entry(vin, entry, true, Some(warning)))
                }
                None => Err(Error::UpstreamDecode(format!("{}: {}", vin, e))),
            },
        }
    }

    /// Decode a VIN and write the result onto its vehicle, if stored
    ///
    /// `entered` holds user-supplied fields. They are recorded as manual
    /// overrides before the provider is asked, so they survive a failed
    /// decode and are never replaced by this decode or any later one.
    pub async fn decode_and_apply(&self, raw_vin: &str, entered: &DecodedVehicle) -> Result<DecodeOutcome> {
        let vin = parse_vin(raw_vin)?;

        let overrides = {
            let mut conn = self.pool.acquire().await?;
            if !entered.is_empty() {
                vehicles::record_manual_overrides(&mut conn, &vin, entered).await?
            } else {
                vehicles::get_vehicle(&mut conn, vin.as_str())
                    .await?
                    .map(|v| v.overrides())
            }
        };

        let mut outcome = self.decode(vin.as_str()).await?;

        let mut conn = self.pool.acquire().await?;
        if vehicles::apply_decode(&mut conn, &outcome).await? {
            info!(vin = %outcome.vin, "✓ Applied decode to vehicle");
        }

        let overrides = overrides.unwrap_or_else(|| {
            let mut entered_only = ManualOverrides::default();
            entered_only.record(entered);
            entered_only
        });
        outcome.parsed = outcome.parsed.with_overrides(overrides.as_map());

        Ok(outcome)
    }
}

fn parse_vin(raw_vin: &str) -> Result<Vin> {
    validate_vin(raw_vin).ok_or_else(|| Error::Validation(format!("Invalid VIN format: {}", raw_vin.trim())))
}
