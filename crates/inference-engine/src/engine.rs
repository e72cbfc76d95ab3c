//! Inference Engine Implementation

use crate::artifact::{check_pair, decode_classifier, ModelArtifact};
use crate::fallback::{synthesize, FallbackParams};
use crate::InferenceError;
use feature_codec::{StressLevel, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Where the active model came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ModelSource {
    /// Real artifact read from disk or uploaded
    Loaded,
    /// Generated from random data because no usable artifact was found
    SyntheticFallback { reason: String },
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Classifier blob path
    pub classifier_path: PathBuf,
    /// Scaler blob path
    pub scaler_path: PathBuf,
    /// Parameters of the synthetic fallback
    pub fallback: FallbackParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            classifier_path: PathBuf::from("data/classifier.bin"),
            scaler_path: PathBuf::from("data/scaler.bin"),
            fallback: FallbackParams::default(),
        }
    }
}

/// Importance of one named feature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: &'static str,
    pub importance: f64,
}

/// Prediction result from inference
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// Predicted level
    pub stress_level: StressLevel,
    /// Share of the winning class (0.0 to 1.0)
    pub confidence: f64,
    /// Probabilities for each class
    pub probabilities: Vec<f64>,
    /// Per-feature importances, in canonical feature order, when available
    pub importances: Option<Vec<f64>>,
}

impl Prediction {
    /// Most important features, highest first
    pub fn top_features(&self, n: usize) -> Vec<FeatureImportance> {
        let Some(importances) = &self.importances else {
            return Vec::new();
        };
        let mut ranked: Vec<FeatureImportance> = FEATURE_NAMES
            .iter()
            .zip(importances)
            .map(|(&feature, &importance)| FeatureImportance { feature, importance })
            .collect();
        ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        ranked.truncate(n);
        ranked
    }
}

/// Result of inference operation
#[derive(Debug, Clone)]
pub struct InferenceResult {
    /// The prediction
    pub prediction: Prediction,
    /// Inference latency in microseconds
    pub latency_us: u64,
    /// Whether the synthetic fallback model produced it
    pub used_fallback: bool,
}

/// Scaler + classifier inference engine
pub struct InferenceEngine {
    config: EngineConfig,
    artifact: ModelArtifact,
    source: ModelSource,
}

impl InferenceEngine {
    /// Load the artifact pair, synthesizing a fallback when it is missing or unusable
    pub fn load(config: EngineConfig) -> Result<Self, InferenceError> {
        info!(
            "Loading model from {} and {}",
            config.classifier_path.display(),
            config.scaler_path.display()
        );

        let loaded = if config.classifier_path.exists() && config.scaler_path.exists() {
            ModelArtifact::load(&config.classifier_path, &config.scaler_path)
        } else {
            Err(InferenceError::ModelLoadError("model files not found".to_string()))
        };

        let (artifact, source) = match loaded {
            Ok(artifact) => {
                info!("Model loaded successfully ({})", artifact.classifier.kind());
                (artifact, ModelSource::Loaded)
            }
            Err(e) => {
                warn!("Using synthetic fallback model: {}", e);
                let artifact = synthesize(&config.fallback)?;
                (
                    artifact,
                    ModelSource::SyntheticFallback {
                        reason: e.to_string(),
                    },
                )
            }
        };

        Ok(Self {
            config,
            artifact,
            source,
        })
    }

    /// Wrap an in-memory artifact
    pub fn from_artifact(config: EngineConfig, artifact: ModelArtifact, source: ModelSource) -> Self {
        Self {
            config,
            artifact,
            source,
        }
    }

    /// Run inference on a feature vector
    pub fn predict(&self, features: &[f64]) -> Result<InferenceResult, InferenceError> {
        let start = std::time::Instant::now();

        let scaled = self.artifact.scaler.transform(features)?;
        if scaled.len() != self.artifact.classifier.n_features() {
            return Err(InferenceError::InvalidInputShape {
                expected: self.artifact.classifier.n_features(),
                actual: scaled.len(),
            });
        }

        let probabilities = self.artifact.classifier.predict_proba(&scaled);
        let (class, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| InferenceError::InferenceFailed("classifier has no classes".to_string()))?;
        let stress_level = StressLevel::from_class(class).ok_or(InferenceError::UnknownClass(class))?;

        let latency_us = start.elapsed().as_micros() as u64;
        debug!("Inference completed in {}us: {}", latency_us, stress_level);

        Ok(InferenceResult {
            prediction: Prediction {
                stress_level,
                confidence,
                probabilities,
                importances: self.artifact.classifier.feature_importances(),
            },
            latency_us,
            used_fallback: self.is_fallback(),
        })
    }

    /// Swap in an uploaded classifier blob and persist it.
    ///
    /// The blob must decode and match the current scaler's dimension;
    /// otherwise nothing changes.
    pub fn replace_classifier(&mut self, bytes: &[u8]) -> Result<(), InferenceError> {
        let classifier = decode_classifier(bytes)?;
        check_pair(&classifier, &self.artifact.scaler)?;

        storage::write_atomic(&self.config.classifier_path, bytes)?;
        if !self.config.scaler_path.exists() {
            // A fallback scaler is what the new classifier will be paired with
            storage::write_atomic(
                &self.config.scaler_path,
                &crate::artifact::encode_scaler(&self.artifact.scaler)?,
            )?;
        }

        info!("Replaced classifier with uploaded {} model", classifier.kind());
        self.artifact.classifier = classifier;
        self.source = ModelSource::Loaded;
        Ok(())
    }

    /// Where the active model came from
    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    /// Whether predictions come from the synthetic fallback
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ModelSource::SyntheticFallback { .. })
    }

    /// Active artifact
    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Input dimension the model expects
    pub fn n_features(&self) -> usize {
        self.artifact.scaler.n_features()
    }
}
