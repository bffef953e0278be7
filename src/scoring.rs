//! Scoring adapter
//!
//! Wraps the trained classifier behind `predict(features) -> (label, probability)`.
//! The classifier is loaded once at startup and never replaced.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{FeatureValue, FeatureVector, Label};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("feature set does not match the model (missing: [{}], unexpected: [{}])", .missing.join(", "), .unexpected.join(", "))]
    FeatureShapeMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    #[error("field '{field}' has an unsupported value")]
    InvalidFeatureValue { field: String },
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
}

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid model artifact: {0}")]
    Invalid(String),
}

/// A trained binary classifier
pub trait Classifier: Send + Sync {
    /// Artifact version for logs and health output
    fn version(&self) -> &str;

    /// Input fields in the order `predict_proba` expects them
    fn expected_features(&self) -> &[String];

    /// Decision threshold on the fraud probability
    fn threshold(&self) -> f64 {
        0.5
    }

    /// Turn one request field into the numeric input the model was trained on
    fn encode(&self, field: &str, value: &FeatureValue) -> Result<f64, ScoringError> {
        value
            .as_number()
            .filter(|n| n.is_finite())
            .ok_or_else(|| ScoringError::InvalidFeatureValue { field: field.to_string() })
    }

    /// Probability of the fraud class for one encoded row
    fn predict_proba(&self, row: &[f64]) -> Result<f64, ScoringError>;
}

// ============================================================================
// LOGISTIC REGRESSION ARTIFACT
// ============================================================================

/// JSON export of a trained logistic-regression pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    #[serde(default = "default_model_type")]
    pub model_type: String,
    #[serde(default)]
    pub version: String,
    pub features: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Label encoding for categorical fields: field -> (category -> code)
    #[serde(default)]
    pub categorical: HashMap<String, HashMap<String, f64>>,
}

fn default_model_type() -> String {
    "logistic_regression".to_string()
}

fn default_threshold() -> f64 {
    0.5
}

pub struct LogisticModel {
    artifact: ModelArtifact,
}

impl LogisticModel {
    /// Load and validate an artifact from disk
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let artifact: ModelArtifact = serde_json::from_str(&raw)?;
        let model = Self::from_artifact(artifact)?;

        info!(
            path = %path.display(),
            version = %model.artifact.version,
            features = model.artifact.features.len(),
            "Model artifact loaded"
        );
        Ok(model)
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelLoadError> {
        if artifact.model_type != "logistic_regression" {
            return Err(ModelLoadError::Invalid(format!(
                "unsupported model type '{}'",
                artifact.model_type
            )));
        }
        if artifact.features.is_empty() {
            return Err(ModelLoadError::Invalid("no input features".into()));
        }
        if artifact.features.len() != artifact.coefficients.len() {
            return Err(ModelLoadError::Invalid(format!(
                "{} features but {} coefficients",
                artifact.features.len(),
                artifact.coefficients.len()
            )));
        }
        let unique: BTreeSet<&String> = artifact.features.iter().collect();
        if unique.len() != artifact.features.len() {
            return Err(ModelLoadError::Invalid("duplicate feature names".into()));
        }
        if !(artifact.threshold > 0.0 && artifact.threshold < 1.0) {
            return Err(ModelLoadError::Invalid(format!(
                "threshold {} outside (0, 1)",
                artifact.threshold
            )));
        }
        if let Some(field) = artifact.categorical.keys().find(|f| !unique.contains(f)) {
            return Err(ModelLoadError::Invalid(format!(
                "categorical encoding for unknown field '{}'",
                field
            )));
        }
        if !artifact.intercept.is_finite() || artifact.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelLoadError::Invalid("non-finite weights".into()));
        }

        Ok(Self { artifact })
    }
}

impl Classifier for LogisticModel {
    fn version(&self) -> &str {
        &self.artifact.version
    }

    fn expected_features(&self) -> &[String] {
        &self.artifact.features
    }

    fn threshold(&self) -> f64 {
        self.artifact.threshold
    }

    fn encode(&self, field: &str, value: &FeatureValue) -> Result<f64, ScoringError> {
        match (self.artifact.categorical.get(field), value) {
            (Some(codes), FeatureValue::Text(category)) => codes
                .get(category)
                .copied()
                .ok_or_else(|| ScoringError::InvalidFeatureValue { field: field.to_string() }),
            (Some(_), FeatureValue::Number(n)) if n.is_finite() => Ok(*n),
            (None, FeatureValue::Number(n)) if n.is_finite() => Ok(*n),
            _ => Err(ScoringError::InvalidFeatureValue { field: field.to_string() }),
        }
    }

    fn predict_proba(&self, row: &[f64]) -> Result<f64, ScoringError> {
        if row.len() != self.artifact.coefficients.len() {
            return Err(ScoringError::ModelUnavailable(format!(
                "row has {} values, model expects {}",
                row.len(),
                self.artifact.coefficients.len()
            )));
        }

        let logit = self.artifact.intercept
            + row
                .iter()
                .zip(&self.artifact.coefficients)
                .map(|(x, w)| x * w)
                .sum::<f64>();

        Ok(1.0 / (1.0 + (-logit).exp()))
    }
}

// ============================================================================
// ADAPTER
// ============================================================================

pub struct ScoringAdapter {
    classifier: Arc<dyn Classifier>,
}

impl ScoringAdapter {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    pub fn model_version(&self) -> &str {
        self.classifier.version()
    }

    /// Reject a vector whose field set differs from the model's
    pub fn check_shape(&self, features: &FeatureVector) -> Result<(), ScoringError> {
        let expected: BTreeSet<&str> = self
            .classifier
            .expected_features()
            .iter()
            .map(String::as_str)
            .collect();
        let supplied: BTreeSet<&str> = features.names().collect();

        if expected == supplied {
            return Ok(());
        }

        Err(ScoringError::FeatureShapeMismatch {
            missing: expected.difference(&supplied).map(|s| s.to_string()).collect(),
            unexpected: supplied.difference(&expected).map(|s| s.to_string()).collect(),
        })
    }

    /// Score one transaction on the blocking pool
    pub async fn predict(&self, features: &FeatureVector) -> Result<(Label, f64), ScoringError> {
        self.check_shape(features)?;

        let row = self
            .classifier
            .expected_features()
            .iter()
            .map(|name| {
                let value = features.get(name).ok_or_else(|| ScoringError::FeatureShapeMismatch {
                    missing: vec![name.clone()],
                    unexpected: Vec::new(),
                })?;
                self.classifier.encode(name, value)
            })
            .collect::<Result<Vec<f64>, ScoringError>>()?;

        let classifier = Arc::clone(&self.classifier);
        let probability = tokio::task::spawn_blocking(move || classifier.predict_proba(&row))
            .await
            .map_err(|e| ScoringError::ModelUnavailable(format!("scoring task failed: {}", e)))??;

        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(ScoringError::ModelUnavailable(format!(
                "classifier returned probability {}",
                probability
            )));
        }

        let label = Label::from_probability(probability, self.classifier.threshold());
        debug!(?label, probability, "Transaction scored");
        Ok((label, probability))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> ModelArtifact {
        serde_json::from_str(
            r#"{
                "version": "test-1",
                "features": ["purchase_value", "age", "source"],
                "coefficients": [0.02, -0.01, 1.5],
                "intercept": -1.0,
                "threshold": 0.5,
                "categorical": {"source": {"SEO": 0, "Ads": 1, "Direct": 2}}
            }"#,
        )
        .unwrap()
    }

    fn adapter() -> ScoringAdapter {
        ScoringAdapter::new(Arc::new(LogisticModel::from_artifact(artifact()).unwrap()))
    }

    #[test]
    fn test_artifact_validation() {
        let mut bad = artifact();
        bad.coefficients.pop();
        assert!(matches!(LogisticModel::from_artifact(bad), Err(ModelLoadError::Invalid(_))));

        let mut bad = artifact();
        bad.threshold = 1.5;
        assert!(LogisticModel::from_artifact(bad).is_err());

        let mut bad = artifact();
        bad.categorical.insert("browser".into(), HashMap::new());
        assert!(LogisticModel::from_artifact(bad).is_err());

        let mut bad = artifact();
        bad.model_type = "random_forest".into();
        assert!(LogisticModel::from_artifact(bad).is_err());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, serde_json::to_string(&artifact()).unwrap()).unwrap();

        let model = LogisticModel::load(&path).unwrap();
        assert_eq!(model.version(), "test-1");
        assert!(matches!(
            LogisticModel::load(&dir.path().join("missing.json")),
            Err(ModelLoadError::Io { .. })
        ));
    }

    #[test]
    fn test_shape_mismatch_lists_fields() {
        let features = FeatureVector::new()
            .with("purchase_value", 10.0)
            .with("browser", "Chrome");

        let err = adapter().check_shape(&features).unwrap_err();
        assert_eq!(
            err,
            ScoringError::FeatureShapeMismatch {
                missing: vec!["age".into(), "source".into()],
                unexpected: vec!["browser".into()],
            }
        );
        assert!(err.to_string().contains("missing: [age, source]"));
    }

    #[tokio::test]
    async fn test_predict_is_deterministic() {
        let adapter = adapter();
        let features = FeatureVector::new()
            .with("purchase_value", 120.0)
            .with("age", 30.0)
            .with("source", "Direct");

        let first = adapter.predict(&features).await.unwrap();
        let second = adapter.predict(&features).await.unwrap();
        assert_eq!(first, second);

        // logit = -1 + 2.4 - 0.3 + 3.0 = 4.1
        let expected = 1.0 / (1.0 + (-4.1f64).exp());
        assert!((first.1 - expected).abs() < 1e-12);
        assert_eq!(first.0, Label::Fraud);
    }

    #[tokio::test]
    async fn test_low_score_is_legitimate() {
        let features = FeatureVector::new()
            .with("purchase_value", 1.0)
            .with("age", 60.0)
            .with("source", "SEO");

        let (label, probability) = adapter().predict(&features).await.unwrap();
        assert_eq!(label, Label::Legitimate);
        assert!(probability < 0.5);
    }

    #[tokio::test]
    async fn test_unknown_category_rejected() {
        let features = FeatureVector::new()
            .with("purchase_value", 1.0)
            .with("age", 60.0)
            .with("source", "Carrier Pigeon");

        assert_eq!(
            adapter().predict(&features).await.unwrap_err(),
            ScoringError::InvalidFeatureValue { field: "source".into() }
        );
    }

    #[tokio::test]
    async fn test_text_in_numeric_field_rejected() {
        let features = FeatureVector::new()
            .with("purchase_value", "lots")
            .with("age", 60.0)
            .with("source", "SEO");

        assert!(matches!(
            adapter().predict(&features).await,
            Err(ScoringError::InvalidFeatureValue { .. })
        ));
    }
}
