//! Configuration loading and database path resolution
//!
//! Resolution follows the same priority order for every setting:
//! 1. Command-line argument (highest priority, applied by the caller)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged and
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG: &str = "CRM_CONFIG";
/// Environment variable overriding the target database path
pub const ENV_DATABASE: &str = "CRM_DATABASE";
/// Environment variable overriding the legacy database path
pub const ENV_LEGACY_DATABASE: &str = "CRM_LEGACY_DATABASE";
/// Environment variable overriding the VIN decode provider base URL
pub const ENV_VIN_DECODE_URL: &str = "CRM_VIN_DECODE_URL";

/// Default VIN decode provider (NHTSA vPIC)
pub const DEFAULT_DECODE_BASE_URL: &str = "https://vpic.nhtsa.dot.gov/api/vehicles";
/// Hard deadline for a single provider call
pub const DEFAULT_DECODE_TIMEOUT_SECS: u64 = 6;
/// Freshness window for cached decodes
pub const DEFAULT_DECODE_TTL_DAYS: i64 = 180;
/// Value recorded in `decoded_source` for provider results
pub const DEFAULT_DECODE_SOURCE: &str = "nhtsa_vpic";

/// Whether dealer-flag recomputation may clear a flag that is already set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealerPolicy {
    /// Recomputation only ever sets `is_dealer`; existing `true` values stay.
    #[default]
    SetOnly,
    /// Recomputation writes the classifier result, clearing stale flags.
    Recompute,
}

/// VIN decode provider and cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub ttl_days: i64,
    pub source: String,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DECODE_BASE_URL.to_string(),
            timeout_secs: DEFAULT_DECODE_TIMEOUT_SECS,
            ttl_days: DEFAULT_DECODE_TTL_DAYS,
            source: DEFAULT_DECODE_SOURCE.to_string(),
        }
    }
}

/// Dealer classification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DealerSettings {
    pub policy: DealerPolicy,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing level when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete tool settings
///
/// Mirrors the TOML file layout:
///
/// ```toml
/// database = "/var/lib/crm-recon/crm.db"
/// legacy_database = "/srv/legacy/shop.db"
///
/// [decode]
/// base_url = "https://vpic.nhtsa.dot.gov/api/vehicles"
/// timeout_secs = 6
/// ttl_days = 180
///
/// [dealer]
/// policy = "set_only"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: PathBuf,
    pub legacy_database: Option<PathBuf>,
    pub decode: DecodeSettings,
    pub dealer: DealerSettings,
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            legacy_database: None,
            decode: DecodeSettings::default(),
            dealer: DealerSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings: TOML file (if any) → environment overrides.
    ///
    /// `cli_config` is an explicit `--config` path; when given it must exist.
    pub fn load(cli_config: Option<&Path>) -> Result<Self> {
        let mut settings = match cli_config {
            Some(path) => Self::from_toml_file(path)?,
            None => match locate_config_file() {
                Some(path) => match Self::from_toml_file(&path) {
                    Ok(settings) => settings,
                    Err(e) => {
                        warn!("Ignoring unreadable config {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                None => {
                    info!("No config file found - using compiled defaults");
                    Self::default()
                }
            },
        };

        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Parse a TOML config file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        info!("Loaded config: {}", path.display());
        Ok(settings)
    }

    /// Apply environment variable overrides (tier 2)
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = non_empty_env(ENV_DATABASE) {
            self.database = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env(ENV_LEGACY_DATABASE) {
            self.legacy_database = Some(PathBuf::from(path));
        }
        if let Some(url) = non_empty_env(ENV_VIN_DECODE_URL) {
            self.decode.base_url = url;
        }
    }

    /// Reject settings that would make every run fail later
    pub fn validate(&self) -> Result<()> {
        if self.decode.timeout_secs == 0 {
            return Err(Error::Config("decode.timeout_secs must be positive".to_string()));
        }
        if self.decode.ttl_days < 0 {
            return Err(Error::Config("decode.ttl_days must not be negative".to_string()));
        }
        if self.decode.base_url.trim().is_empty() {
            return Err(Error::Config("decode.base_url must not be empty".to_string()));
        }
        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Find the config file: $CRM_CONFIG, then the user config dir, then /etc
fn locate_config_file() -> Option<PathBuf> {
    if let Some(path) = non_empty_env(ENV_CONFIG) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("crm-recon").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/crm-recon/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// OS-dependent default location of the target database
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("crm-recon").join("crm.db"))
        .unwrap_or_else(|| PathBuf::from("./crm_data/crm.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.decode.timeout_secs, 6);
        assert_eq!(settings.decode.ttl_days, 180);
        assert_eq!(settings.decode.source, "nhtsa_vpic");
        assert_eq!(settings.dealer.policy, DealerPolicy::SetOnly);
        assert!(settings.legacy_database.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            legacy_database = "/srv/legacy.db"

            [dealer]
            policy = "recompute"
            "#,
        )
        .unwrap();

        assert_eq!(settings.legacy_database, Some(PathBuf::from("/srv/legacy.db")));
        assert_eq!(settings.dealer.policy, DealerPolicy::Recompute);
        assert_eq!(settings.decode.ttl_days, 180);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut settings = Settings::default();
        settings.decode.timeout_secs = 0;
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }
}
