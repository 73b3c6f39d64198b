//! Vehicle projection of a provider payload, and manual-override layering

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `{year, make, model, trim}` derived from `Results[0]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedVehicle {
    pub year: Option<i64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
}

impl DecodedVehicle {
    /// Derive the projection from a raw provider payload
    ///
    /// Accepts vPIC's `ModelYear`/`Make`/`Model`/`Trim` keys and plain
    /// lowercase keys; `Series` stands in for a missing trim.
    pub fn from_payload(raw: &Value) -> Self {
        let first = raw
            .get("Results")
            .or_else(|| raw.get("results"))
            .and_then(|r| r.as_array())
            .and_then(|r| r.first());

        let Some(result) = first.and_then(|r| r.as_object()) else {
            return Self::default();
        };

        let text = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| result.get(*k))
                .filter_map(non_empty_text)
                .next()
        };

        Self {
            year: text(&["ModelYear", "model_year", "year"]).and_then(|y| y.parse().ok()),
            make: text(&["Make", "make"]),
            model: text(&["Model", "model"]),
            trim: text(&["Trim", "trim", "Series", "series"]),
        }
    }

    /// Per-field override: any field present in `overrides` wins
    pub fn with_overrides(mut self, overrides: &Map<String, Value>) -> Self {
        if let Some(year) = overrides.get("year").and_then(as_year) {
            self.year = Some(year);
        }
        for (field, slot) in [
            ("make", &mut self.make),
            ("model", &mut self.model),
            ("trim", &mut self.trim),
        ] {
            if let Some(value) = overrides.get(field).and_then(non_empty_text) {
                *slot = Some(value);
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.make.is_none() && self.model.is_none() && self.trim.is_none()
    }
}

/// User-entered vehicle fields that must survive re-decoding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualOverrides(Map<String, Value>);

impl ManualOverrides {
    /// Parse the stored sidecar; anything but a JSON object is treated as empty
    pub fn from_stored(stored: Option<&Value>) -> Self {
        match stored {
            Some(Value::Object(map)) => Self(map.clone()),
            _ => Self::default(),
        }
    }

    /// Record user-supplied values (existing entries are replaced)
    pub fn record(&mut self, entered: &DecodedVehicle) {
        if let Some(year) = entered.year {
            self.0.insert("year".to_string(), Value::from(year));
        }
        for (field, value) in [("make", &entered.make), ("model", &entered.model), ("trim", &entered.trim)] {
            if let Some(value) = value {
                self.0.insert(field.to_string(), Value::from(value.as_str()));
            }
        }
    }

    /// Record an arbitrary key (e.g. the legacy vehicle id)
    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// JSON value for storage, `None` when there is nothing to store
    pub fn to_stored(&self) -> Option<Value> {
        (!self.0.is_empty()).then(|| Value::Object(self.0.clone()))
    }
}

fn non_empty_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_year(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "Count": 1,
            "Results": [{
                "ModelYear": "2003",
                "Make": "HONDA",
                "Model": "Accord",
                "Trim": "",
                "Series": "EX",
                "ErrorCode": "0"
            }]
        })
    }

    #[test]
    fn test_projection_from_vpic_payload() {
        let decoded = DecodedVehicle::from_payload(&payload());
        assert_eq!(decoded.year, Some(2003));
        assert_eq!(decoded.make.as_deref(), Some("HONDA"));
        assert_eq!(decoded.model.as_deref(), Some("Accord"));
        // empty Trim falls back to Series
        assert_eq!(decoded.trim.as_deref(), Some("EX"));
    }

    #[test]
    fn test_projection_of_unexpected_payload_is_empty() {
        assert!(DecodedVehicle::from_payload(&json!({"Results": []})).is_empty());
        assert!(DecodedVehicle::from_payload(&json!("nope")).is_empty());
    }

    #[test]
    fn test_overrides_win_per_field() {
        let mut overrides = ManualOverrides::default();
        overrides.record(&DecodedVehicle {
            make: Some("Honda".to_string()),
            ..Default::default()
        });

        let layered = DecodedVehicle::from_payload(&payload()).with_overrides(overrides.as_map());
        assert_eq!(layered.make.as_deref(), Some("Honda"));
        assert_eq!(layered.model.as_deref(), Some("Accord"));
        assert!(overrides.contains("make"));
        assert!(!overrides.contains("model"));
    }

    #[test]
    fn test_stored_overrides_round_trip() {
        let stored = json!({"year": 1999, "legacy_vehicle_id": "V-7"});
        let overrides = ManualOverrides::from_stored(Some(&stored));
        assert!(overrides.contains("year"));
        assert_eq!(overrides.to_stored(), Some(stored));
        assert_eq!(ManualOverrides::from_stored(Some(&json!([1, 2]))).to_stored(), None);
    }
}
