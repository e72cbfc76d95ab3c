//! Raw form input validation and fixed-order encoding

use crate::error::ValidationError;
use crate::fields::{index_of, FeatureSpec, FEATURES, FEATURE_DIMENSION};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Validated feature vector in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<i64>", into = "Vec<i64>")]
pub struct FeatureVector {
    values: [u8; FEATURE_DIMENSION],
}

impl FeatureVector {
    /// Build from positional values in canonical order
    pub fn from_values(values: &[i64]) -> Result<Self, ValidationError> {
        if values.len() != FEATURE_DIMENSION {
            return Err(ValidationError::WrongLength {
                expected: FEATURE_DIMENSION,
                actual: values.len(),
            });
        }

        let mut out = [0u8; FEATURE_DIMENSION];
        for (i, (spec, &value)) in FEATURES.iter().zip(values).enumerate() {
            out[i] = check_value(spec, value as f64)?;
        }
        Ok(Self { values: out })
    }

    /// Values in canonical order
    pub fn values(&self) -> &[u8; FEATURE_DIMENSION] {
        &self.values
    }

    /// Values as model input
    pub fn as_f64(&self) -> Vec<f64> {
        self.values.iter().map(|&v| f64::from(v)).collect()
    }

    /// Value of a named feature
    pub fn get(&self, name: &str) -> Option<u8> {
        index_of(name).map(|i| self.values[i])
    }

    /// `(name, value)` pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u8)> + '_ {
        FEATURES.iter().zip(self.values.iter()).map(|(f, &v)| (f.name, v))
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        let mut values = [0u8; FEATURE_DIMENSION];
        for (slot, spec) in values.iter_mut().zip(FEATURES.iter()) {
            *slot = spec.kind.default_value();
        }
        Self { values }
    }
}

impl TryFrom<Vec<i64>> for FeatureVector {
    type Error = ValidationError;

    fn try_from(values: Vec<i64>) -> Result<Self, Self::Error> {
        Self::from_values(&values)
    }
}

impl From<FeatureVector> for Vec<i64> {
    fn from(vector: FeatureVector) -> Self {
        vector.values.iter().map(|&v| i64::from(v)).collect()
    }
}

/// Result of validating a full set of raw inputs
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether all values are valid
    pub valid: bool,
    /// Every problem found, in canonical field order
    pub errors: Vec<ValidationError>,
}

/// Check one raw value against its feature's declared range
pub fn check_value(spec: &FeatureSpec, value: f64) -> Result<u8, ValidationError> {
    if value.fract() != 0.0 || !value.is_finite() {
        return Err(ValidationError::NotAnInteger {
            field: spec.name,
            value,
        });
    }

    let (min, max) = spec.kind.range();
    if value < min as f64 || value > max as f64 {
        return Err(ValidationError::OutOfRange {
            field: spec.name,
            value,
            min,
            max,
        });
    }

    Ok(value as u8)
}

/// Validate raw inputs, collecting every error instead of stopping at the first
pub fn validate(raw: &HashMap<String, f64>) -> ValidationResult {
    let mut errors = Vec::new();

    let mut unknown: Vec<&String> = raw.keys().filter(|k| index_of(k).is_none()).collect();
    unknown.sort();
    errors.extend(unknown.into_iter().map(|k| ValidationError::UnknownField(k.clone())));

    for spec in FEATURES.iter() {
        match raw.get(spec.name) {
            Some(&value) => {
                if let Err(e) = check_value(spec, value) {
                    errors.push(e);
                }
            }
            None => errors.push(ValidationError::MissingField(spec.name)),
        }
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

/// Encode raw named inputs into the canonical feature vector
pub fn encode(raw: &HashMap<String, f64>) -> Result<FeatureVector, ValidationError> {
    if let Some(name) = raw.keys().filter(|k| index_of(k).is_none()).min() {
        return Err(ValidationError::UnknownField(name.clone()));
    }

    let mut values = [0u8; FEATURE_DIMENSION];
    for (slot, spec) in values.iter_mut().zip(FEATURES.iter()) {
        let value = raw
            .get(spec.name)
            .copied()
            .ok_or(ValidationError::MissingField(spec.name))?;
        *slot = check_value(spec, value)?;
    }

    debug!("Encoded feature vector {:?}", values);
    Ok(FeatureVector { values })
}
