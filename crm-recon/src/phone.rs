//! US phone number normalization
//!
//! Legacy data holds phones as formatted strings, bare digits, numeric
//! spreadsheet cells and, after a round trip through a spreadsheet,
//! scientific notation (`5.551234567E+9`). Everything normalizes to E.164
//! (`+15551234567`) plus a display form (`555-123-4567`).

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::Value;

static SCIENTIFIC_NOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)e\+?\d+$").expect("exponent pattern compiles"));

/// Result of normalizing one phone value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedPhone {
    pub valid: bool,
    pub e164: Option<String>,
    pub display: Option<String>,
    /// The input as a string, after scientific-notation recovery
    pub raw: String,
}

/// Normalize a phone given as text. Never fails.
pub fn normalize_phone(raw: &str) -> NormalizedPhone {
    from_raw_string(recover_scientific(raw.trim()))
}

/// Normalize a phone cell; numeric cells are truncated to an integer string
pub fn normalize_phone_value(value: &Value) -> NormalizedPhone {
    match value {
        Value::Null => from_raw_string(String::new()),
        Value::Number(n) => {
            let raw = match n.as_i64() {
                Some(i) => i.to_string(),
                None => n
                    .as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| format!("{:.0}", f.trunc()))
                    .unwrap_or_default(),
            };
            from_raw_string(raw)
        }
        Value::String(s) => normalize_phone(s),
        other => normalize_phone(&other.to_string()),
    }
}

/// Convert a stored E.164 value back to `NNN-NNN-NNNN`
pub fn format_e164_display(e164: &str) -> Option<String> {
    let digits = digits_only(e164);
    match digits.len() {
        11 if digits.starts_with('1') => Some(display_from_digits(&digits[1..])),
        10 => Some(display_from_digits(&digits)),
        _ => None,
    }
}

/// Ten-digit national number, if the value holds one
pub fn national_digits(raw: &str) -> Option<String> {
    let digits = digits_only(raw);
    match digits.len() {
        11 if digits.starts_with('1') => Some(digits[1..].to_string()),
        10 => Some(digits),
        _ => None,
    }
}

fn from_raw_string(raw: String) -> NormalizedPhone {
    match national_digits(&raw) {
        Some(digits) => NormalizedPhone {
            valid: true,
            e164: Some(format!("+1{}", digits)),
            display: Some(display_from_digits(&digits)),
            raw,
        },
        None => NormalizedPhone {
            valid: false,
            e164: None,
            display: (!raw.is_empty()).then(|| raw.clone()),
            raw,
        },
    }
}

/// `5.551234567E+9` -> `5551234567`, exactly; a fractional part rounds
/// half away from zero
fn recover_scientific(text: &str) -> String {
    if text.contains(' ') || !SCIENTIFIC_NOTATION.is_match(text) {
        return text.to_string();
    }

    match Decimal::from_scientific(text) {
        Ok(value) => value
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
            .to_string(),
        Err(_) => text.to_string(),
    }
}

fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn display_from_digits(digits: &str) -> String {
    format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equivalent_forms_share_e164() {
        let forms = [
            "5551234567",
            "(555) 123-4567",
            "1-555-123-4567",
            "+1 555.123.4567",
            "5.551234567E+9",
            "5.551234567e9",
        ];
        for form in forms {
            let phone = normalize_phone(form);
            assert!(phone.valid, "{form} should be valid");
            assert_eq!(phone.e164.as_deref(), Some("+15551234567"), "{form}");
            assert_eq!(phone.display.as_deref(), Some("555-123-4567"), "{form}");
        }
    }

    #[test]
    fn test_scientific_notation_rounds_fraction() {
        assert_eq!(normalize_phone("5.5512345678E+9").e164.as_deref(), Some("+15551234568"));
        assert_eq!(normalize_phone("5.5512345672E+9").e164.as_deref(), Some("+15551234567"));
        assert_eq!(normalize_phone("5.5512345675e9").e164.as_deref(), Some("+15551234568"));
    }

    #[test]
    fn test_numeric_cells_are_truncated() {
        assert_eq!(normalize_phone_value(&json!(5551234567i64)).e164.as_deref(), Some("+15551234567"));
        assert_eq!(normalize_phone_value(&json!(5551234567.0)).e164.as_deref(), Some("+15551234567"));
        assert_eq!(normalize_phone_value(&json!(15551234567.9)).e164.as_deref(), Some("+15551234567"));
    }

    #[test]
    fn test_invalid_keeps_raw_for_display() {
        let phone = normalize_phone("555-1234");
        assert!(!phone.valid);
        assert_eq!(phone.e164, None);
        assert_eq!(phone.display.as_deref(), Some("555-1234"));
        assert_eq!(phone.raw, "555-1234");

        let empty = normalize_phone("   ");
        assert!(!empty.valid);
        assert_eq!(empty.display, None);
        assert_eq!(normalize_phone_value(&Value::Null).display, None);
    }

    #[test]
    fn test_eleven_digits_without_country_code_is_invalid() {
        assert!(!normalize_phone("25551234567").valid);
    }

    #[test]
    fn test_spaced_exponent_is_not_scientific() {
        // "ext" style text must not be parsed as a number
        let phone = normalize_phone("555 123 4567 e2");
        assert!(!phone.valid);
    }

    #[test]
    fn test_format_e164_display() {
        assert_eq!(format_e164_display("+15551234567").as_deref(), Some("555-123-4567"));
        assert_eq!(format_e164_display("5551234567").as_deref(), Some("555-123-4567"));
        assert_eq!(format_e164_display("+4420"), None);
    }
}
