//! Stress Inference Engine
//!
//! Scales an encoded feature vector and classifies it into a
//! [`feature_codec::StressLevel`]. Models are read from a pair of postcard
//! blobs; when those are missing or unreadable a seeded synthetic model
//! stands in and every result is flagged.

mod artifact;
mod classifier;
mod engine;
mod fallback;
mod forest;
mod scaler;

pub use artifact::{decode_classifier, decode_scaler, encode_classifier, encode_scaler, ModelArtifact, FORMAT_VERSION};
pub use classifier::{Classifier, NearestCentroid};
pub use engine::{
    EngineConfig, FeatureImportance, InferenceEngine, InferenceResult, ModelSource, Prediction,
};
pub use fallback::{synthesize, FallbackParams};
pub use forest::{DecisionTree, ForestParams, RandomForest};
pub use scaler::StandardScaler;

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Invalid model artifact: {0}")]
    InvalidArtifact(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: usize, actual: usize },
    #[error("Classifier produced unknown class {0}")]
    UnknownClass(usize),
    #[error("Model write failed: {0}")]
    Io(#[from] std::io::Error),
}
