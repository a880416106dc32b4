use std::str::FromStr;
use std::time::Duration;

use bon::Builder;

use crate::error::{CheckinError, CheckinResult};

pub const DEFAULT_FACE_ID_INDEX: &str = "face_id-index";
pub const DEFAULT_MATCH_THRESHOLD: f32 = 95.0;
pub const DEFAULT_MIN_FACE_CONFIDENCE: f32 = 90.0;
pub const DEFAULT_METRICS_NAMESPACE: &str = "PatientCheckin";

#[derive(Builder, Debug, Clone, PartialEq)]
pub struct CheckinConfig {
    #[builder(into)]
    pub collection_id: String,

    #[builder(into)]
    pub table_name: String,

    #[builder(into, default = DEFAULT_FACE_ID_INDEX.to_string())]
    pub face_id_index: String,

    /// Minimum similarity (percent) for an identification to count.
    #[builder(default = DEFAULT_MATCH_THRESHOLD)]
    pub match_threshold: f32,

    /// Minimum detection confidence (percent) for a registration photo.
    #[builder(default = DEFAULT_MIN_FACE_CONFIDENCE)]
    pub min_face_confidence: f32,

    #[builder(default = Duration::from_secs(30))]
    pub execution_timeout: Duration,

    /// Time that must remain before the final external call is issued.
    #[builder(default = Duration::from_millis(1000))]
    pub min_remaining: Duration,

    #[builder(default = 3)]
    pub max_attempts: u32,

    #[builder(into, default = DEFAULT_METRICS_NAMESPACE.to_string())]
    pub metrics_namespace: String,

    #[builder(default = true)]
    pub metrics_enabled: bool,
}

impl CheckinConfig {
    pub fn from_env() -> CheckinResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> CheckinResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| CheckinError::Config(format!("{key} is required but not set")))
        };

        let match_threshold = parse_or(&lookup, "MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD)?;
        let min_face_confidence =
            parse_or(&lookup, "MIN_FACE_CONFIDENCE", DEFAULT_MIN_FACE_CONFIDENCE)?;
        check_percentage("MATCH_THRESHOLD", match_threshold)?;
        check_percentage("MIN_FACE_CONFIDENCE", min_face_confidence)?;

        let max_attempts: u32 = parse_or(&lookup, "MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(CheckinError::Config(
                "MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        // Also the SDK operation timeout; zero would fail every call.
        let execution_timeout_secs: u64 = parse_or(&lookup, "EXECUTION_TIMEOUT_SECS", 30)?;
        if execution_timeout_secs == 0 {
            return Err(CheckinError::Config(
                "EXECUTION_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }

        Ok(Self::builder()
            .collection_id(required("COLLECTION_ID")?)
            .table_name(required("TABLE_NAME")?)
            .face_id_index(non_blank_or(&lookup, "FACE_ID_INDEX", DEFAULT_FACE_ID_INDEX)?)
            .match_threshold(match_threshold)
            .min_face_confidence(min_face_confidence)
            .execution_timeout(Duration::from_secs(execution_timeout_secs))
            .min_remaining(Duration::from_millis(parse_or(
                &lookup,
                "MIN_REMAINING_MS",
                1000,
            )?))
            .max_attempts(max_attempts)
            .metrics_namespace(non_blank_or(
                &lookup,
                "METRICS_NAMESPACE",
                DEFAULT_METRICS_NAMESPACE,
            )?)
            .metrics_enabled(parse_or(&lookup, "METRICS_ENABLED", true)?)
            .build())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> CheckinResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| CheckinError::Config(format!("invalid {key} {raw:?}: {e}"))),
        None => Ok(default),
    }
}

fn non_blank_or<F>(lookup: &F, key: &str, default: &str) -> CheckinResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if raw.trim().is_empty() => {
            Err(CheckinError::Config(format!("{key} must not be empty")))
        }
        Some(raw) => Ok(raw.trim().to_string()),
        None => Ok(default.to_string()),
    }
}

fn check_percentage(key: &str, value: f32) -> CheckinResult<()> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(CheckinError::Config(format!(
            "{key} must be between 0 and 100, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_required_vars() {
        let config = CheckinConfig::from_lookup(lookup_from(&[
            ("COLLECTION_ID", "patients"),
            ("TABLE_NAME", "patients-table"),
        ]))
        .unwrap();

        assert_eq!(config.collection_id, "patients");
        assert_eq!(config.table_name, "patients-table");
        assert_eq!(config.face_id_index, "face_id-index");
        assert_eq!(config.match_threshold, 95.0);
        assert_eq!(config.min_face_confidence, 90.0);
        assert_eq!(config.execution_timeout, Duration::from_secs(30));
        assert_eq!(config.min_remaining, Duration::from_millis(1000));
        assert_eq!(config.max_attempts, 3);
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_overrides() {
        let config = CheckinConfig::from_lookup(lookup_from(&[
            ("COLLECTION_ID", "patients"),
            ("TABLE_NAME", "patients-table"),
            ("MATCH_THRESHOLD", "98.5"),
            ("MIN_REMAINING_MS", "250"),
            ("METRICS_ENABLED", "false"),
            ("FACE_ID_INDEX", "by-face"),
        ]))
        .unwrap();

        assert_eq!(config.match_threshold, 98.5);
        assert_eq!(config.min_remaining, Duration::from_millis(250));
        assert!(!config.metrics_enabled);
        assert_eq!(config.face_id_index, "by-face");
    }

    #[test]
    fn test_missing_collection_fails() {
        let err = CheckinConfig::from_lookup(lookup_from(&[("TABLE_NAME", "t")])).unwrap_err();
        assert!(matches!(err, CheckinError::Config(ref msg) if msg.contains("COLLECTION_ID")));
    }

    #[test]
    fn test_threshold_out_of_range_fails() {
        let err = CheckinConfig::from_lookup(lookup_from(&[
            ("COLLECTION_ID", "c"),
            ("TABLE_NAME", "t"),
            ("MATCH_THRESHOLD", "120"),
        ]))
        .unwrap_err();
        assert!(matches!(err, CheckinError::Config(_)));
    }

    #[test]
    fn test_unparseable_value_fails() {
        let err = CheckinConfig::from_lookup(lookup_from(&[
            ("COLLECTION_ID", "c"),
            ("TABLE_NAME", "t"),
            ("MAX_ATTEMPTS", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("MAX_ATTEMPTS"));
    }

    #[test]
    fn test_zero_execution_timeout_fails() {
        let err = CheckinConfig::from_lookup(lookup_from(&[
            ("COLLECTION_ID", "c"),
            ("TABLE_NAME", "t"),
            ("EXECUTION_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, CheckinError::Config(ref msg) if msg.contains("EXECUTION_TIMEOUT_SECS")));
    }

    #[test]
    fn test_blank_names_fail() {
        for key in ["FACE_ID_INDEX", "METRICS_NAMESPACE"] {
            let err = CheckinConfig::from_lookup(lookup_from(&[
                ("COLLECTION_ID", "c"),
                ("TABLE_NAME", "t"),
                (key, "  "),
            ]))
            .unwrap_err();
            assert!(matches!(err, CheckinError::Config(ref msg) if msg.contains(key)));
        }
    }

    #[test]
    fn test_builder_defaults() {
        let config = CheckinConfig::builder()
            .collection_id("c")
            .table_name("t")
            .build();
        assert_eq!(config.metrics_namespace, "PatientCheckin");
        assert_eq!(config.match_threshold, DEFAULT_MATCH_THRESHOLD);
    }
}
