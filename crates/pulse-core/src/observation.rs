//! Observations handed over by the acquisition side.
//!
//! A [`RawObservation`] is whatever the source produced; [`Observation`] is
//! the validated form the tracker accepts. Validation is the only place a
//! loosely-shaped metric map is turned into the fixed [`Metrics`] record.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};
use crate::types::{normalize_key, EntityAttributes, Metric, Metrics};

/// Observation as delivered by the acquisition collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    /// External key (handle), not yet normalized.
    pub key: String,
    #[serde(default)]
    pub attributes: Option<EntityAttributes>,
    /// Metric name → value. Tracked metrics that are absent count as zero.
    #[serde(default)]
    pub metrics: BTreeMap<String, i64>,
    /// Opaque source payload kept for audit.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

/// A validated observation for one entity in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Normalized (case-folded) external key.
    pub key: String,
    pub attributes: Option<EntityAttributes>,
    pub metrics: Metrics,
    pub payload: Option<serde_json::Value>,
}

impl Observation {
    /// Build an observation from an already-typed metrics record.
    pub fn new(key: &str, metrics: Metrics) -> ValidationResult<Self> {
        let key = normalize_key(key).ok_or(ValidationError::EmptyKey)?;
        Ok(Self {
            key,
            attributes: None,
            metrics,
            payload: None,
        })
    }

    pub fn with_attributes(mut self, attributes: EntityAttributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Validate a raw observation.
    ///
    /// Rejects empty keys, unnamed or unknown metrics, negative values, and
    /// a metric reported under more than one alias.
    pub fn validate(raw: RawObservation) -> ValidationResult<Self> {
        let key = normalize_key(&raw.key).ok_or(ValidationError::EmptyKey)?;
        let mut metrics = Metrics::default();
        let mut seen = BTreeSet::new();
        for (name, value) in &raw.metrics {
            let name = name.trim();
            if name.is_empty() {
                return Err(ValidationError::UnnamedMetric(*value));
            }
            let metric = Metric::from_name(name)
                .ok_or_else(|| ValidationError::UnknownMetric(name.to_string()))?;
            if !seen.insert(metric) {
                return Err(ValidationError::DuplicateMetric(metric));
            }
            let value = u64::try_from(*value).map_err(|_| ValidationError::NegativeMetric {
                name: name.to_string(),
                value: *value,
            })?;
            metrics.set(metric, value);
        }
        Ok(Self {
            key,
            attributes: raw.attributes,
            metrics,
            payload: raw.payload,
        })
    }
}

impl TryFrom<RawObservation> for Observation {
    type Error = ValidationError;

    fn try_from(raw: RawObservation) -> ValidationResult<Self> {
        Self::validate(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(key: &str, metrics: &[(&str, i64)]) -> RawObservation {
        RawObservation {
            key: key.to_string(),
            metrics: metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn validate_fills_missing_metrics_with_zero() {
        let obs = Observation::validate(raw("@Creator", &[("followers", 1000)])).unwrap();
        assert_eq!(obs.key, "creator");
        assert_eq!(obs.metrics.followers, 1000);
        assert_eq!(obs.metrics.following, 0);
        assert_eq!(obs.metrics.videos, 0);
    }

    #[test]
    fn validate_accepts_column_aliases() {
        let obs = Observation::validate(raw(
            "creator",
            &[("followers_count", 5), ("video_count", 2)],
        ))
        .unwrap();
        assert_eq!(obs.metrics.followers, 5);
        assert_eq!(obs.metrics.videos, 2);
    }

    #[test]
    fn validate_rejects_metric_reported_under_two_aliases() {
        let err = Observation::validate(raw(
            "creator",
            &[("followers", 100), ("followers_count", 5)],
        ))
        .unwrap_err();
        assert_eq!(err, ValidationError::DuplicateMetric(Metric::Followers));

        let err = Observation::validate(raw("creator", &[("videos", 1), ("video_count", 1)])).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateMetric(Metric::Videos));
    }

    #[test]
    fn validate_rejects_negative_values() {
        let err = Observation::validate(raw("creator", &[("likes", -1)])).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NegativeMetric {
                name: "likes".to_string(),
                value: -1
            }
        );
    }

    #[test]
    fn validate_rejects_unnamed_and_unknown_metrics() {
        assert_eq!(
            Observation::validate(raw("creator", &[(" ", 3)])).unwrap_err(),
            ValidationError::UnnamedMetric(3)
        );
        assert_eq!(
            Observation::validate(raw("creator", &[("shares", 3)])).unwrap_err(),
            ValidationError::UnknownMetric("shares".to_string())
        );
    }

    #[test]
    fn validate_rejects_empty_key() {
        assert_eq!(
            Observation::validate(raw(" @ ", &[])).unwrap_err(),
            ValidationError::EmptyKey
        );
    }

    #[test]
    fn raw_observation_parses_from_json() {
        let json = r#"{
            "key": "@tiktok",
            "attributes": {"display_name": "TikTok", "verified": true},
            "metrics": {"followers": 1000, "following": 100, "likes": 5000, "videos": 20},
            "payload": {"source": "fixture"}
        }"#;
        let raw: RawObservation = serde_json::from_str(json).unwrap();
        let obs = Observation::try_from(raw).unwrap();
        assert_eq!(obs.key, "tiktok");
        assert_eq!(obs.metrics.likes, 5000);
        assert!(obs.attributes.unwrap().verified);
        assert!(obs.payload.is_some());
    }
}
