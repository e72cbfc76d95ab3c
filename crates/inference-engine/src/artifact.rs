//! Model artifact blobs
//!
//! Each blob is postcard-encoded as `(format version, kind, payload)`. The
//! classifier and scaler live in separate files so the classifier can be
//! replaced on its own.

use crate::classifier::Classifier;
use crate::scaler::StandardScaler;
use crate::InferenceError;
use feature_codec::StressLevel;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Current blob format version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum ArtifactKind {
    Classifier,
    Scaler,
}

fn encode<T: Serialize>(kind: ArtifactKind, payload: &T) -> Result<Vec<u8>, InferenceError> {
    postcard::to_allocvec(&(FORMAT_VERSION, kind, payload))
        .map_err(|e| InferenceError::InvalidArtifact(format!("encode failed: {}", e)))
}

fn decode<T: DeserializeOwned>(kind: ArtifactKind, bytes: &[u8]) -> Result<T, InferenceError> {
    let ((version, found), rest): ((u32, ArtifactKind), &[u8]) = postcard::take_from_bytes(bytes)
        .map_err(|e| InferenceError::InvalidArtifact(format!("unreadable header: {}", e)))?;
    if version != FORMAT_VERSION {
        return Err(InferenceError::InvalidArtifact(format!(
            "format version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }
    if found != kind {
        return Err(InferenceError::InvalidArtifact(format!(
            "expected a {:?} blob, found {:?}",
            kind, found
        )));
    }
    postcard::from_bytes(rest)
        .map_err(|e| InferenceError::InvalidArtifact(format!("unreadable payload: {}", e)))
}

/// Encode a classifier blob
pub fn encode_classifier(classifier: &Classifier) -> Result<Vec<u8>, InferenceError> {
    encode(ArtifactKind::Classifier, classifier)
}

/// Decode a classifier blob
pub fn decode_classifier(bytes: &[u8]) -> Result<Classifier, InferenceError> {
    decode(ArtifactKind::Classifier, bytes)
}

/// Encode a scaler blob
pub fn encode_scaler(scaler: &StandardScaler) -> Result<Vec<u8>, InferenceError> {
    encode(ArtifactKind::Scaler, scaler)
}

/// Decode a scaler blob
pub fn decode_scaler(bytes: &[u8]) -> Result<StandardScaler, InferenceError> {
    decode(ArtifactKind::Scaler, bytes)
}

/// Paired classifier and feature scaler
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub classifier: Classifier,
    pub scaler: StandardScaler,
}

impl ModelArtifact {
    /// Pair a classifier with a scaler of the same dimension
    pub fn new(classifier: Classifier, scaler: StandardScaler) -> Result<Self, InferenceError> {
        check_pair(&classifier, &scaler)?;
        Ok(Self { classifier, scaler })
    }

    /// Read both blobs from disk
    pub fn load(classifier_path: &Path, scaler_path: &Path) -> Result<Self, InferenceError> {
        let read = |path: &Path| {
            std::fs::read(path).map_err(|e| {
                InferenceError::ModelLoadError(format!("{}: {}", path.display(), e))
            })
        };
        let classifier = decode_classifier(&read(classifier_path)?)?;
        let scaler = decode_scaler(&read(scaler_path)?)?;
        debug!(
            "Decoded {} classifier and {}-feature scaler",
            classifier.kind(),
            scaler.n_features()
        );
        Self::new(classifier, scaler)
    }

    /// Write both blobs atomically
    pub fn save(&self, classifier_path: &Path, scaler_path: &Path) -> Result<(), InferenceError> {
        storage::write_atomic(classifier_path, &encode_classifier(&self.classifier)?)?;
        storage::write_atomic(scaler_path, &encode_scaler(&self.scaler)?)?;
        Ok(())
    }
}

/// Classifier must be well formed, cover exactly the stress levels and
/// agree with the scaler on the input dimension
pub(crate) fn check_pair(classifier: &Classifier, scaler: &StandardScaler) -> Result<(), InferenceError> {
    classifier.validate()?;
    if classifier.n_classes() != StressLevel::ALL.len() {
        return Err(InferenceError::InvalidArtifact(format!(
            "classifier has {} classes, expected {}",
            classifier.n_classes(),
            StressLevel::ALL.len()
        )));
    }
    if classifier.n_features() != scaler.n_features() {
        return Err(InferenceError::InvalidArtifact(format!(
            "classifier expects {} features but scaler was fit on {}",
            classifier.n_features(),
            scaler.n_features()
        )));
    }
    Ok(())
}
