//! Synthetic fallback model
//!
//! Used when no real artifact can be loaded so prediction stays available.
//! Labels are random, so its output carries no information about the input;
//! callers are told via [`crate::ModelSource::SyntheticFallback`].

use crate::artifact::ModelArtifact;
use crate::classifier::Classifier;
use crate::forest::{ForestParams, RandomForest};
use crate::scaler::StandardScaler;
use crate::InferenceError;
use feature_codec::FEATURE_DIMENSION;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Shape of the synthetic training set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackParams {
    /// Number of synthetic rows
    pub samples: usize,
    /// Seed for the synthetic data
    pub seed: u64,
    /// Label probabilities for LOW, MODERATE, HIGH
    pub class_weights: [f64; 3],
    /// Forest trained on the synthetic rows
    pub forest: ForestParams,
}

impl Default for FallbackParams {
    fn default() -> Self {
        Self {
            samples: 1000,
            seed: 42,
            class_weights: [0.5, 0.35, 0.15],
            forest: ForestParams::default(),
        }
    }
}

/// Train a scaler and random forest on seeded random data
pub fn synthesize(params: &FallbackParams) -> Result<ModelArtifact, InferenceError> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let labels_dist = WeightedIndex::new(params.class_weights)
        .map_err(|e| InferenceError::ModelLoadError(format!("invalid class weights: {}", e)))?;

    let samples: Vec<Vec<f64>> = (0..params.samples.max(1))
        .map(|_| {
            (0..FEATURE_DIMENSION)
                .map(|_| rng.gen::<f64>() * 9.0 + 1.0)
                .collect()
        })
        .collect();
    let labels: Vec<usize> = samples.iter().map(|_| labels_dist.sample(&mut rng)).collect();

    let scaler = StandardScaler::fit(&samples);
    let scaled = scaler.transform_all(&samples)?;
    let forest = RandomForest::fit(&scaled, &labels, &params.forest);

    info!(
        "Synthesized fallback model: samples={}, trees={}",
        samples.len(),
        forest.n_trees()
    );
    ModelArtifact::new(Classifier::RandomForest(forest), scaler)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> FallbackParams {
        FallbackParams {
            samples: 200,
            forest: ForestParams {
                n_trees: 5,
                max_depth: 6,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(synthesize(&quick()).unwrap(), synthesize(&quick()).unwrap());
    }

    #[test]
    fn test_dimension() {
        let artifact = synthesize(&quick()).unwrap();
        assert_eq!(artifact.scaler.n_features(), FEATURE_DIMENSION);
        assert_eq!(artifact.classifier.n_features(), FEATURE_DIMENSION);
        assert!(artifact.classifier.feature_importances().is_some());
    }

    #[test]
    fn test_invalid_weights() {
        let params = FallbackParams {
            class_weights: [0.0, 0.0, 0.0],
            ..quick()
        };
        assert!(synthesize(&params).is_err());
    }
}
