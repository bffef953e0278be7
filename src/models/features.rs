//! Feature vector model and cache fingerprinting
//!
//! A `FeatureVector` is keyed by field name in a `BTreeMap`, so the
//! request's key order never reaches the fingerprint.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fingerprint format version. Bump when the hashing input changes.
const FINGERPRINT_VERSION: &[u8] = b"FV2";

/// A single transaction field: numeric or categorical
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
}

impl FeatureValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(n) => Some(*n),
            FeatureValue::Text(_) => None,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

/// Named input values describing one transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(BTreeMap<String, FeatureValue>);

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<FeatureValue>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.0.get(name)
    }

    /// Field names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Deterministic SHA-256 over sorted (name, typed value) pairs
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_VERSION);

        // Length-prefixed names and text keep field boundaries unambiguous
        for (name, value) in &self.0 {
            update_prefixed(&mut hasher, name.as_bytes());
            match value {
                FeatureValue::Number(n) => {
                    // -0.0 and 0.0 score identically
                    let n = if *n == 0.0 { 0.0 } else { *n };
                    hasher.update(b"n");
                    hasher.update(n.to_bits().to_be_bytes());
                }
                FeatureValue::Text(s) => {
                    hasher.update(b"s");
                    update_prefixed(&mut hasher, s.as_bytes());
                }
            }
        }

        Fingerprint(format!("{:x}", hasher.finalize()))
    }
}

fn update_prefixed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

impl FromIterator<(String, FeatureValue)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (String, FeatureValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Hex-encoded cache key for a feature vector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
