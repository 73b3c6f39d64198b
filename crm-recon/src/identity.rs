//! Identity resolution
//!
//! Maps an incoming record to a canonical customer (and possibly a vehicle)
//! without a shared foreign key. Keys are tried in priority order:
//!
//! 1. VIN found in the record that names a stored vehicle (vehicle + owner)
//! 2. Legacy identifier (`legacy_client_id`, `legacy_customer_id`)
//! 3. Normalized email
//! 4. Normalized phone (E.164)
//! 5. Full name, case- and whitespace-insensitive
//!
//! A key value shared by two or more customers is ambiguous and never
//! matches; resolution moves on to the next key. A record whose keys were all
//! ambiguous or absent resolves to nothing.
//!
//! The index is built once per run and updated in-pass as importers create
//! customers and vehicles, so one real-world person gets at most one
//! canonical row per pass.

use crate::db::customers::CustomerKeys;
use crate::phone::normalize_phone;
use crate::vin::{annotated_vins, token_vins, validate_vin, vin_candidates, Vin};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// What a key maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    Unique(i64),
    /// Shared by at least two distinct customers
    Ambiguous,
}

/// Key that produced a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Vin,
    LegacyId,
    Email,
    Phone,
    Name,
}

impl fmt::Display for MatchedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchedBy::Vin => "vin",
            MatchedBy::LegacyId => "legacy_id",
            MatchedBy::Email => "email",
            MatchedBy::Phone => "phone",
            MatchedBy::Name => "name",
        };
        f.write_str(name)
    }
}

/// Identity-bearing fields of an incoming record
#[derive(Debug, Clone, Default)]
pub struct IdentityRecord {
    /// Legacy identifiers, most authoritative first
    pub legacy_ids: Vec<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    /// Dedicated VIN field
    pub vin: Option<String>,
    /// Free text to sweep for VINs, in priority order
    pub free_text: Vec<String>,
}

impl IdentityRecord {
    /// Normalized name key: explicit full name, else "first last"
    pub fn name_key(&self) -> Option<String> {
        match &self.full_name {
            Some(full) => name_key(full),
            None => name_key(&format!(
                "{} {}",
                self.first_name.as_deref().unwrap_or(""),
                self.last_name.as_deref().unwrap_or("")
            )),
        }
    }

    /// Whether the record carries any key the resolver can use
    pub fn has_keys(&self) -> bool {
        !self.legacy_ids.is_empty()
            || self.email.as_deref().and_then(email_key).is_some()
            || self.phone.is_some()
            || self.name_key().is_some()
            || self.vin.is_some()
            || !self.free_text.is_empty()
    }

    /// Format-valid VINs in sweep order: VIN field, then annotated VINs in
    /// the free text (in text order), then bare 17-character tokens
    pub fn vin_sweep(&self) -> Vec<Vin> {
        let mut found: Vec<Vin> = Vec::new();
        let mut push = |vin: Vin| {
            if !found.contains(&vin) {
                found.push(vin);
            }
        };

        if let Some(vin) = self.vin.as_deref() {
            match validate_vin(vin) {
                Some(valid) => push(valid),
                None => vin_candidates(vin).into_iter().for_each(&mut push),
            }
        }

        for text in &self.free_text {
            annotated_vins(text).into_iter().for_each(&mut push);
        }
        for text in &self.free_text {
            token_vins(text).into_iter().for_each(&mut push);
        }

        found
    }
}

/// Outcome of resolving one record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub customer_id: Option<i64>,
    pub vehicle_vin: Option<String>,
    pub matched_by: Option<MatchedBy>,
    /// At least one key was ambiguous and nothing unique matched
    pub ambiguous: bool,
}

impl Resolution {
    fn customer(id: i64, matched_by: MatchedBy) -> Self {
        Self {
            customer_id: Some(id),
            vehicle_vin: None,
            matched_by: Some(matched_by),
            ambiguous: false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.customer_id.is_some()
    }
}

/// Lookup maps from identity keys to customers
#[derive(Debug, Default)]
pub struct IdentityIndex {
    by_legacy_id: HashMap<String, KeyMatch>,
    by_email: HashMap<String, KeyMatch>,
    by_phone: HashMap<String, KeyMatch>,
    by_name: HashMap<String, KeyMatch>,
    vehicles: HashMap<String, i64>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored customer keys and VIN owners
    pub fn build(customers: &[CustomerKeys], vehicles: &[(String, i64)]) -> Self {
        let mut index = Self::new();
        for keys in customers {
            let record = IdentityRecord {
                legacy_ids: [&keys.legacy_client_id, &keys.legacy_customer_id]
                    .into_iter()
                    .flatten()
                    .cloned()
                    .collect(),
                email: keys.email.clone(),
                phone: None,
                first_name: keys.first_name.clone(),
                last_name: keys.last_name.clone(),
                full_name: None,
                vin: None,
                free_text: Vec::new(),
            };
            index.register_customer(keys.id, &record);

            // Both the normalized and the legacy phone column can carry a key
            for phone in [&keys.phone_e164, &keys.legacy_phone].into_iter().flatten() {
                index.register_phone(keys.id, phone);
            }
        }
        for (vin, owner) in vehicles {
            index.vehicles.insert(vin.to_uppercase(), *owner);
        }

        debug!(
            legacy_ids = index.by_legacy_id.len(),
            emails = index.by_email.len(),
            phones = index.by_phone.len(),
            names = index.by_name.len(),
            vehicles = index.vehicles.len(),
            "Identity index built"
        );
        index
    }

    /// Add a customer's keys to the index
    pub fn register_customer(&mut self, id: i64, record: &IdentityRecord) {
        for legacy_id in &record.legacy_ids {
            if let Some(key) = legacy_id_key(legacy_id) {
                insert_key(&mut self.by_legacy_id, key, id);
            }
        }
        if let Some(key) = record.email.as_deref().and_then(email_key) {
            insert_key(&mut self.by_email, key, id);
        }
        if let Some(phone) = record.phone.as_deref() {
            self.register_phone(id, phone);
        }
        if let Some(key) = record.name_key() {
            insert_key(&mut self.by_name, key, id);
        }
    }

    fn register_phone(&mut self, id: i64, phone: &str) {
        if let Some(key) = normalize_phone(phone).e164 {
            insert_key(&mut self.by_phone, key, id);
        }
    }

    /// Record a vehicle's owner
    pub fn register_vehicle(&mut self, vin: &Vin, customer_id: i64) {
        self.vehicles.insert(vin.as_str().to_string(), customer_id);
    }

    /// Owner of a stored vehicle
    pub fn vehicle_owner(&self, vin: &str) -> Option<i64> {
        self.vehicles.get(&vin.trim().to_uppercase()).copied()
    }

    /// Resolve a record to a customer (and vehicle when matched by VIN)
    pub fn resolve(&self, record: &IdentityRecord) -> Resolution {
        for vin in record.vin_sweep() {
            if let Some(owner) = self.vehicles.get(vin.as_str()) {
                return Resolution {
                    customer_id: Some(*owner),
                    vehicle_vin: Some(vin.into_string()),
                    matched_by: Some(MatchedBy::Vin),
                    ambiguous: false,
                };
            }
        }

        let mut ambiguous = false;
        let mut check = |map: &HashMap<String, KeyMatch>, key: Option<String>| -> Option<i64> {
            match key.and_then(|k| map.get(&k).copied()) {
                Some(KeyMatch::Unique(id)) => Some(id),
                Some(KeyMatch::Ambiguous) => {
                    ambiguous = true;
                    None
                }
                None => None,
            }
        };

        for legacy_id in &record.legacy_ids {
            if let Some(id) = check(&self.by_legacy_id, legacy_id_key(legacy_id)) {
                return Resolution::customer(id, MatchedBy::LegacyId);
            }
        }
        if let Some(id) = check(&self.by_email, record.email.as_deref().and_then(email_key)) {
            return Resolution::customer(id, MatchedBy::Email);
        }
        let phone_key = record.phone.as_deref().and_then(|p| normalize_phone(p).e164);
        if let Some(id) = check(&self.by_phone, phone_key) {
            return Resolution::customer(id, MatchedBy::Phone);
        }
        if let Some(id) = check(&self.by_name, record.name_key()) {
            return Resolution::customer(id, MatchedBy::Name);
        }

        Resolution {
            ambiguous,
            ..Default::default()
        }
    }
}

fn insert_key(map: &mut HashMap<String, KeyMatch>, key: String, id: i64) {
    map.entry(key)
        .and_modify(|existing| {
            if *existing != KeyMatch::Unique(id) {
                *existing = KeyMatch::Ambiguous;
            }
        })
        .or_insert(KeyMatch::Unique(id));
}

fn legacy_id_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Trim + lowercase; values without `@` are not emails
pub fn email_key(raw: &str) -> Option<String> {
    let key = raw.trim().to_lowercase();
    (key.contains('@')).then_some(key)
}

/// Lowercase with internal whitespace collapsed
pub fn name_key(raw: &str) -> Option<String> {
    let key = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    (!key.is_empty()).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(id: i64, legacy: Option<&str>, email: Option<&str>, phone: Option<&str>, name: (&str, &str)) -> CustomerKeys {
        CustomerKeys {
            id,
            legacy_customer_id: legacy.map(String::from),
            legacy_client_id: None,
            email: email.map(String::from),
            legacy_phone: phone.map(String::from),
            phone_e164: None,
            first_name: Some(name.0.to_string()),
            last_name: Some(name.1.to_string()),
        }
    }

    fn phone_only(phone: &str) -> IdentityRecord {
        IdentityRecord {
            phone: Some(phone.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_shared_phone_is_ambiguous() {
        let index = IdentityIndex::build(
            &[
                keys(1, None, None, Some("555-123-4567"), ("Ann", "Lee")),
                keys(2, None, None, Some("(555) 123 4567"), ("Bo", "Diaz")),
            ],
            &[],
        );

        let resolution = index.resolve(&phone_only("5551234567"));
        assert_eq!(resolution.customer_id, None);
        assert!(resolution.ambiguous);
    }

    #[test]
    fn test_legacy_id_beats_phone() {
        let index = IdentityIndex::build(
            &[
                keys(1, Some("A-100"), None, None, ("Ann", "Lee")),
                keys(2, None, None, Some("5551234567"), ("Bo", "Diaz")),
            ],
            &[],
        );

        let record = IdentityRecord {
            legacy_ids: vec!["A-100".to_string()],
            phone: Some("5551234567".to_string()),
            ..Default::default()
        };
        let resolution = index.resolve(&record);
        assert_eq!(resolution.customer_id, Some(1));
        assert_eq!(resolution.matched_by, Some(MatchedBy::LegacyId));
    }

    #[test]
    fn test_ambiguous_key_falls_through_to_next_key() {
        let index = IdentityIndex::build(
            &[
                keys(1, None, Some("shop@example.com"), None, ("Ann", "Lee")),
                keys(2, None, Some("shop@example.com"), Some("5550001111"), ("Bo", "Diaz")),
            ],
            &[],
        );

        let record = IdentityRecord {
            email: Some("SHOP@example.com ".to_string()),
            phone: Some("555-000-1111".to_string()),
            ..Default::default()
        };
        let resolution = index.resolve(&record);
        assert_eq!(resolution.customer_id, Some(2));
        assert_eq!(resolution.matched_by, Some(MatchedBy::Phone));
        assert!(!resolution.ambiguous);
    }

    #[test]
    fn test_name_match_is_case_and_whitespace_insensitive() {
        let index = IdentityIndex::build(&[keys(7, None, None, None, ("Mary Ann", "Smith"))], &[]);
        let record = IdentityRecord {
            full_name: Some("  mary   ann SMITH ".to_string()),
            ..Default::default()
        };
        assert_eq!(index.resolve(&record).customer_id, Some(7));
    }

    #[test]
    fn test_vin_in_free_text_overrides_other_keys() {
        let index = IdentityIndex::build(
            &[
                keys(1, None, Some("ann@example.com"), None, ("Ann", "Lee")),
                keys(2, None, None, None, ("Bo", "Diaz")),
            ],
            &[("1HGCM82633A004352".to_string(), 2)],
        );

        let record = IdentityRecord {
            email: Some("ann@example.com".to_string()),
            free_text: vec!["Ceramic coat (VIN: 1hgcm82633a004352)".to_string()],
            ..Default::default()
        };
        let resolution = index.resolve(&record);
        assert_eq!(resolution.customer_id, Some(2));
        assert_eq!(resolution.vehicle_vin.as_deref(), Some("1HGCM82633A004352"));
        assert_eq!(resolution.matched_by, Some(MatchedBy::Vin));
    }

    #[test]
    fn test_unknown_vin_does_not_block_other_keys() {
        let index = IdentityIndex::build(&[keys(1, None, Some("ann@example.com"), None, ("Ann", "Lee"))], &[]);
        let record = IdentityRecord {
            email: Some("ann@example.com".to_string()),
            vin: Some("1HGCM82633A004352".to_string()),
            ..Default::default()
        };
        let resolution = index.resolve(&record);
        assert_eq!(resolution.customer_id, Some(1));
        assert_eq!(resolution.vehicle_vin, None);
    }

    #[test]
    fn test_register_customer_in_pass() {
        let mut index = IdentityIndex::new();
        let record = IdentityRecord {
            email: Some("new@example.com".to_string()),
            ..Default::default()
        };
        assert!(!index.resolve(&record).is_resolved());

        index.register_customer(99, &record);
        assert_eq!(index.resolve(&record).customer_id, Some(99));

        // Registering the same customer twice keeps the key unique
        index.register_customer(99, &record);
        assert_eq!(index.resolve(&record).customer_id, Some(99));
    }

    #[test]
    fn test_vin_sweep_order() {
        let record = IdentityRecord {
            vin: None,
            free_text: vec![
                "tint 2HGFA16598H500001".to_string(),
                "see VIN: 1HGCM82633A004352".to_string(),
            ],
            ..Default::default()
        };
        let sweep: Vec<String> = record.vin_sweep().into_iter().map(Vin::into_string).collect();
        // annotated VINs anywhere come before bare tokens
        assert_eq!(sweep, vec!["1HGCM82633A004352", "2HGFA16598H500001"]);
    }
}
