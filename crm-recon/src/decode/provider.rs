//! VIN decode providers
//!
//! The production provider is NHTSA vPIC (`DecodeVinValuesExtended`). The
//! cache only sees the [`DecodeProvider`] trait so tests can count calls and
//! simulate outages.

use async_trait::async_trait;
use crm_common::config::DecodeSettings;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("crm-recon/", env!("CARGO_PKG_VERSION"));

/// Provider failure; every variant is recoverable by a stale cache entry
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Source of raw VIN decode payloads
#[async_trait]
pub trait DecodeProvider: Send + Sync {
    /// Decode one (already validated) VIN into the provider's raw payload
    async fn decode(&self, vin: &str) -> Result<Value, DecodeError>;
}

/// NHTSA vPIC client
pub struct NhtsaVpicClient {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl NhtsaVpicClient {
    pub fn new(settings: &DecodeSettings) -> Result<Self, DecodeError> {
        let timeout = Duration::from_secs(settings.timeout_secs);
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| DecodeError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn decode_url(&self, vin: &str) -> String {
        format!("{}/DecodeVinValuesExtended/{}?format=json", self.base_url, vin)
    }

    async fn fetch(&self, vin: &str) -> Result<Value, DecodeError> {
        let url = self.decode_url(vin);
        debug!(vin = vin, url = %url, "Querying VIN decode provider");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DecodeError::Timeout(self.timeout)
                } else {
                    DecodeError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DecodeError::ApiError(status.as_u16(), error_text));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| DecodeError::ParseError(e.to_string()))?;

        let has_results = payload
            .get("Results")
            .and_then(|r| r.as_array())
            .map(|r| !r.is_empty())
            .unwrap_or(false);
        if !has_results {
            return Err(DecodeError::ParseError("payload has no Results".to_string()));
        }

        info!(vin = vin, "VIN decode successful");
        Ok(payload)
    }
}

#[async_trait]
impl DecodeProvider for NhtsaVpicClient {
    async fn decode(&self, vin: &str) -> Result<Value, DecodeError> {
        // Hard deadline on top of the client timeout (covers slow bodies)
        match tokio::time::timeout(self.timeout, self.fetch(vin)).await {
            Ok(result) => result,
            Err(_) => Err(DecodeError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_url() {
        let settings = DecodeSettings {
            base_url: "http://127.0.0.1:9/api/vehicles/".to_string(),
            ..Default::default()
        };
        let client = NhtsaVpicClient::new(&settings).unwrap();
        assert_eq!(
            client.decode_url("1HGCM82633A004352"),
            "http://127.0.0.1:9/api/vehicles/DecodeVinValuesExtended/1HGCM82633A004352?format=json"
        );
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_network_error() {
        let settings = DecodeSettings {
            // reserved port, nothing listens there
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let client = NhtsaVpicClient::new(&settings).unwrap();
        let err = client.decode("1HGCM82633A004352").await.unwrap_err();
        assert!(matches!(err, DecodeError::NetworkError(_) | DecodeError::Timeout(_)));
    }
}
