//! Classifier variants a model artifact may carry

use crate::forest::RandomForest;
use crate::InferenceError;
use serde::{Deserialize, Serialize};

/// Per-class mean in scaled feature space; predicts the nearest one.
///
/// Exposes no feature importances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestCentroid {
    centroids: Vec<Vec<f64>>,
}

impl NearestCentroid {
    /// Fit class means; classes absent from `labels` get no centroid
    pub fn fit(samples: &[Vec<f64>], labels: &[usize]) -> Self {
        let n_features = samples.first().map_or(0, Vec::len);
        let n_classes = labels.iter().max().map_or(0, |m| m + 1);
        let mut sums = vec![vec![0.0; n_features]; n_classes];
        let mut counts = vec![0usize; n_classes];

        for (sample, &label) in samples.iter().zip(labels) {
            for (acc, v) in sums[label].iter_mut().zip(sample) {
                *acc += v;
            }
            counts[label] += 1;
        }

        let centroids = sums
            .into_iter()
            .zip(counts)
            .map(|(sum, count)| {
                if count == 0 {
                    vec![f64::INFINITY; n_features]
                } else {
                    sum.into_iter().map(|s| s / count as f64).collect()
                }
            })
            .collect();
        Self { centroids }
    }

    pub fn from_centroids(centroids: Vec<Vec<f64>>) -> Self {
        Self { centroids }
    }

    /// Inverse-distance weights over classes
    pub fn predict_proba(&self, sample: &[f64]) -> Vec<f64> {
        let weights: Vec<f64> = self
            .centroids
            .iter()
            .map(|c| {
                let dist: f64 = c.iter().zip(sample).map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt();
                if dist.is_finite() {
                    1.0 / (dist + 1e-9)
                } else {
                    0.0
                }
            })
            .collect();
        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            weights.iter().map(|w| w / total).collect()
        } else {
            weights
        }
    }

    pub fn n_features(&self) -> usize {
        self.centroids.first().map_or(0, Vec::len)
    }

    pub fn n_classes(&self) -> usize {
        self.centroids.len()
    }

    /// Every centroid must share one non-zero dimension
    pub fn validate(&self) -> Result<(), InferenceError> {
        let n_features = self.n_features();
        if n_features == 0 || self.centroids.iter().any(|c| c.len() != n_features) {
            return Err(InferenceError::InvalidArtifact(
                "centroids have inconsistent dimensions".to_string(),
            ));
        }
        Ok(())
    }
}

/// Classifier stored in a model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Classifier {
    RandomForest(RandomForest),
    NearestCentroid(NearestCentroid),
}

impl Classifier {
    /// Short name for logs and health output
    pub fn kind(&self) -> &'static str {
        match self {
            Classifier::RandomForest(_) => "random_forest",
            Classifier::NearestCentroid(_) => "nearest_centroid",
        }
    }

    /// Input dimension the classifier was fit on
    pub fn n_features(&self) -> usize {
        match self {
            Classifier::RandomForest(f) => f.n_features(),
            Classifier::NearestCentroid(c) => c.n_features(),
        }
    }

    /// Number of classes the probabilities cover
    pub fn n_classes(&self) -> usize {
        match self {
            Classifier::RandomForest(f) => f.n_classes(),
            Classifier::NearestCentroid(c) => c.n_classes(),
        }
    }

    /// Structural check run before a decoded classifier is used
    pub fn validate(&self) -> Result<(), InferenceError> {
        match self {
            Classifier::RandomForest(f) => f.validate(),
            Classifier::NearestCentroid(c) => c.validate(),
        }
    }

    /// Class probabilities for one scaled sample
    pub fn predict_proba(&self, sample: &[f64]) -> Vec<f64> {
        match self {
            Classifier::RandomForest(f) => f.predict_proba(sample),
            Classifier::NearestCentroid(c) => c.predict_proba(sample),
        }
    }

    /// Feature importances, when the model kind has them
    pub fn feature_importances(&self) -> Option<Vec<f64>> {
        match self {
            Classifier::RandomForest(f) => Some(f.feature_importances()),
            Classifier::NearestCentroid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_centroid() {
        let samples = vec![vec![0.0, 0.0], vec![0.2, 0.0], vec![5.0, 5.0], vec![5.2, 5.0]];
        let model = Classifier::NearestCentroid(NearestCentroid::fit(&samples, &[0, 0, 1, 1]));

        let proba = model.predict_proba(&[4.9, 5.1]);
        assert!(proba[1] > proba[0]);
        assert_eq!(model.n_features(), 2);
        assert!(model.feature_importances().is_none());
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_ragged_centroids_rejected() {
        let ragged = NearestCentroid::from_centroids(vec![vec![0.0, 1.0], vec![2.0]]);
        assert!(ragged.validate().is_err());
        assert!(NearestCentroid::from_centroids(vec![]).validate().is_err());
    }
}
