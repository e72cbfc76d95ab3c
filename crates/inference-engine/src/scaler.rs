//! Standard (z-score) feature scaler

use crate::InferenceError;
use serde::{Deserialize, Serialize};

/// Per-column z-score transform fitted on training data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    /// Population standard deviation; constant columns use 1.0
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Build from known statistics
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, InferenceError> {
        if mean.len() != scale.len() {
            return Err(InferenceError::InvalidArtifact(format!(
                "scaler has {} means but {} scales",
                mean.len(),
                scale.len()
            )));
        }
        Ok(Self { mean, scale })
    }

    /// Fit column statistics on row-major samples
    pub fn fit(samples: &[Vec<f64>]) -> Self {
        let n_features = samples.first().map_or(0, Vec::len);
        let n = samples.len().max(1) as f64;

        let mut mean = vec![0.0; n_features];
        for row in samples {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut variance = vec![0.0; n_features];
        for row in samples {
            for ((var, v), m) in variance.iter_mut().zip(row).zip(&mean) {
                *var += (v - m) * (v - m);
            }
        }
        let scale = variance
            .into_iter()
            .map(|var| {
                let std_dev = (var / n).sqrt();
                if std_dev > 0.0 {
                    std_dev
                } else {
                    1.0
                }
            })
            .collect();

        Self { mean, scale }
    }

    /// Dimension the scaler was fitted on
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Scale one sample; the sample must match the fitted dimension
    pub fn transform(&self, sample: &[f64]) -> Result<Vec<f64>, InferenceError> {
        if sample.len() != self.n_features() {
            return Err(InferenceError::InvalidInputShape {
                expected: self.n_features(),
                actual: sample.len(),
            });
        }

        Ok(sample
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    /// Scale many samples
    pub fn transform_all(&self, samples: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, InferenceError> {
        samples.iter().map(|s| self.transform(s)).collect()
    }
}
