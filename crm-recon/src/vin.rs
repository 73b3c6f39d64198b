//! VIN format validation and free-text extraction
//!
//! Validation is a format check only: 17 characters, no `I`, `O` or `Q`.
//! The check digit is not verified.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of every modern VIN
pub const VIN_LENGTH: usize = 17;

/// `(VIN: XXXXXXXXXXXXXXXXX)`, `VIN XXXX...`, `VIN#XXXX...`
static VIN_ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bVIN\s*[:#]?\s*([A-Z0-9]{17})\b").expect("annotation pattern compiles")
});

/// Any standalone 17-character alphanumeric token
static VIN_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[A-Z0-9]{17}\b").expect("token pattern compiles"));

/// A format-valid, uppercase VIN
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vin(String);

impl Vin {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Vin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Vin {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trim + uppercase, the form every stored VIN takes
pub fn normalize_vin(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Validate a VIN: exactly 17 characters after trim + uppercase, and none
/// of `I`, `O`, `Q`
pub fn validate_vin(raw: &str) -> Option<Vin> {
    let vin = normalize_vin(raw);
    let valid = vin.chars().count() == VIN_LENGTH && !vin.contains(['I', 'O', 'Q']);
    valid.then_some(Vin(vin))
}

/// Why a VIN was rejected, used for quarantine bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VinRejection {
    MissingVin,
    InvalidVinFormat,
    DuplicateVin,
}

impl VinRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VinRejection::MissingVin => "missing_vin",
            VinRejection::InvalidVinFormat => "invalid_vin_format",
            VinRejection::DuplicateVin => "duplicate_vin",
        }
    }
}

/// Format-valid VINs written as an annotation (`VIN: ...`)
pub fn annotated_vins(text: &str) -> Vec<Vin> {
    VIN_ANNOTATION
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| validate_vin(m.as_str()))
        .collect()
}

/// Format-valid standalone 17-character tokens
pub fn token_vins(text: &str) -> Vec<Vin> {
    VIN_TOKEN
        .find_iter(text)
        .filter_map(|m| validate_vin(m.as_str()))
        .collect()
}

/// Every format-valid VIN in `text`, annotated ones first, without repeats
pub fn vin_candidates(text: &str) -> Vec<Vin> {
    let mut found: Vec<Vin> = Vec::new();
    for vin in annotated_vins(text).into_iter().chain(token_vins(text)) {
        if !found.contains(&vin) {
            found.push(vin);
        }
    }
    found
}

/// First format-valid VIN in `text`
pub fn extract_vin(text: &str) -> Option<Vin> {
    vin_candidates(text).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "1HGCM82633A004352";

    #[test]
    fn test_valid_vin() {
        let vin = validate_vin(GOOD).unwrap();
        assert_eq!(vin.as_str(), GOOD);
        assert_eq!(validate_vin(" 1hgcm82633a004352 ").unwrap().as_str(), GOOD);
    }

    #[test]
    fn test_forbidden_letter_anywhere_is_invalid() {
        for idx in 0..GOOD.len() {
            let mut chars: Vec<char> = GOOD.chars().collect();
            chars[idx] = 'O';
            let candidate: String = chars.into_iter().collect();
            assert!(validate_vin(&candidate).is_none(), "{candidate}");
        }
        assert!(validate_vin("1HGCM82633A00435I").is_none());
        assert!(validate_vin("1HGCM82633A00435Q").is_none());
    }

    #[test]
    fn test_wrong_length_is_invalid() {
        assert!(validate_vin(&GOOD[..16]).is_none());
        assert!(validate_vin(&format!("{GOOD}1")).is_none());
        assert!(validate_vin("").is_none());
    }

    #[test]
    fn test_punctuation_is_not_a_format_error() {
        // length and forbidden letters are the only format rules
        let vin = validate_vin(" 1hgcm82633a-04352").unwrap();
        assert_eq!(vin.as_str(), "1HGCM82633A-04352");
        assert!(validate_vin("1HGCM82633A-0435O").is_none());
    }

    #[test]
    fn test_extract_prefers_annotation() {
        let text = "Tint 2HGFA16598H500001 front, customer car (VIN: 1HGCM82633A004352)";
        assert_eq!(extract_vin(text).unwrap().as_str(), GOOD);

        let candidates = vin_candidates(text);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].as_str(), "2HGFA16598H500001");
    }

    #[test]
    fn test_extract_skips_invalid_tokens() {
        assert!(extract_vin("order ABCDEFGHIJKLMNOPQ ready").is_none());
        assert_eq!(
            extract_vin("plate ABC123, vin 1hgcm82633a004352.").unwrap().as_str(),
            GOOD
        );
    }
}
