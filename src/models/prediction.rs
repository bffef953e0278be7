//! Prediction and cache entry models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::features::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Fraud,
    Legitimate,
}

impl Label {
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            Label::Fraud
        } else {
            Label::Legitimate
        }
    }

    /// Binary class as the training data encodes it
    pub fn as_class(&self) -> u8 {
        match self {
            Label::Fraud => 1,
            Label::Legitimate => 0,
        }
    }
}

/// Where a prediction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSource {
    Cache,
    Model,
}

impl PredictionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub label: Label,
    pub probability: Option<f64>,
    pub source: PredictionSource,
}

impl PredictionResult {
    pub fn from_model(label: Label, probability: f64) -> Self {
        Self {
            label,
            probability: Some(probability),
            source: PredictionSource::Model,
        }
    }

    pub fn from_cache(entry: &CacheEntry) -> Self {
        Self {
            label: entry.label,
            probability: entry.probability,
            source: PredictionSource::Cache,
        }
    }
}

/// Request body of `POST /predict`
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub features: super::features::FeatureVector,
}

/// Response body of `POST /predict`
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: u8,
    pub label: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    pub source: PredictionSource,
}

impl From<PredictionResult> for PredictResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            prediction: result.label.as_class(),
            label: result.label,
            probability: result.probability,
            source: result.source,
        }
    }
}

/// Memoized prediction as held by the cache store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub label: Label,
    pub probability: Option<f64>,
    pub inserted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        fingerprint: Fingerprint,
        label: Label,
        probability: Option<f64>,
        ttl: std::time::Duration,
    ) -> Self {
        let inserted_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        Self {
            fingerprint,
            label,
            probability,
            inserted_at,
            expires_at: inserted_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureVector;
    use std::time::Duration;

    #[test]
    fn test_label_threshold() {
        assert_eq!(Label::from_probability(0.5, 0.5), Label::Fraud);
        assert_eq!(Label::from_probability(0.49, 0.5), Label::Legitimate);
        assert_eq!(Label::Fraud.as_class(), 1);
    }

    #[test]
    fn test_cache_entry_expiry() {
        let fp = FeatureVector::new().with("age", 30.0).fingerprint();
        let entry = CacheEntry::new(fp, Label::Legitimate, Some(0.1), Duration::from_secs(60));

        assert!(!entry.is_expired_at(entry.inserted_at));
        assert!(entry.is_expired_at(entry.inserted_at + chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_response_omits_missing_probability() {
        let fp = FeatureVector::new().with("age", 30.0).fingerprint();
        let entry = CacheEntry::new(fp, Label::Fraud, None, Duration::from_secs(1));
        let body = serde_json::to_value(PredictResponse::from(PredictionResult::from_cache(&entry))).unwrap();

        assert_eq!(body["prediction"], 1);
        assert_eq!(body["label"], "fraud");
        assert_eq!(body["source"], "cache");
        assert!(body.get("probability").is_none());
    }
}
