use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{CheckinError, CheckinResult};

pub const RESERVED_KEYS: [&str; 5] = [
    "patient_id",
    "face_id",
    "created_at",
    "updated_at",
    "similarity",
];

/// Demographic fields stored alongside a patient (`name`, `dob`, `phone`,
/// `email`, `appointment_id`, ...). Values are always strings.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct PatientAttributes(BTreeMap<String, String>);

impl PatientAttributes {
    // Non-string values are dropped, reserved keys rejected.
    pub fn from_json(raw: Map<String, Value>) -> CheckinResult<Self> {
        let mut attributes = BTreeMap::new();

        for (key, value) in raw {
            if RESERVED_KEYS.contains(&key.as_str()) {
                return Err(CheckinError::Validation(format!(
                    "Attribute {key} is reserved"
                )));
            }
            if key.is_empty() {
                return Err(CheckinError::Validation(
                    "Attribute names must not be empty".to_string(),
                ));
            }

            match value {
                Value::String(text) => {
                    attributes.insert(key, text);
                }
                other => warn!(attribute = %key, "Dropping non-string attribute value {}", other),
            }
        }

        Ok(Self(attributes))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name")
    }

    pub fn appointment_id(&self) -> Option<&str> {
        self.get("appointment_id")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PatientAttributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PatientRecord {
    pub patient_id: String,
    pub face_id: String,
    // epoch millis
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(flatten)]
    pub attributes: PatientAttributes,
}

impl PatientRecord {
    pub fn new(patient_id: String, face_id: String, attributes: PatientAttributes) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            patient_id,
            face_id,
            created_at: now,
            updated_at: now,
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_keeps_string_attributes() {
        let attributes = PatientAttributes::from_json(as_map(json!({
            "name": "Test Patient",
            "dob": "1990-01-01",
            "phone": "+1234567890"
        })))
        .unwrap();

        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes.name(), Some("Test Patient"));
        assert_eq!(attributes.get("dob"), Some("1990-01-01"));
    }

    #[test]
    fn test_drops_non_string_values() {
        let attributes = PatientAttributes::from_json(as_map(json!({
            "name": "Test Patient",
            "age": 34,
            "insured": true,
            "tags": ["a"]
        })))
        .unwrap();

        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes.get("age"), None);
    }

    #[test]
    fn test_rejects_reserved_keys() {
        let err = PatientAttributes::from_json(as_map(json!({"face_id": "spoofed"}))).unwrap_err();
        assert!(matches!(err, CheckinError::Validation(_)));
    }

    #[test]
    fn test_record_flattens_attributes() {
        let record = PatientRecord {
            patient_id: "P-1001".to_string(),
            face_id: "face-1".to_string(),
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
            attributes: [("name", "Jane Roe"), ("appointment_id", "A-77")]
                .into_iter()
                .collect(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["patient_id"], "P-1001");
        assert_eq!(json["name"], "Jane Roe");
        assert_eq!(json["appointment_id"], "A-77");
        assert!(json.get("attributes").is_none());

        let back: PatientRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_new_record_sets_timestamps() {
        let record = PatientRecord::new(
            "P-1".to_string(),
            "f-1".to_string(),
            PatientAttributes::default(),
        );
        assert!(record.created_at > 0);
        assert_eq!(record.created_at, record.updated_at);
    }
}
