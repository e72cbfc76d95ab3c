//! Analysis workflow
//!
//! One submission: require login, encode the raw answers, predict, append
//! the record to the history log. Runs to completion without suspending.

use chrono::Utc;
use feature_codec::{encode, StressLevel, ValidationError};
use inference_engine::{FeatureImportance, InferenceEngine, InferenceError};
use serde::Serialize;
use std::collections::HashMap;
use storage::{HistoryLog, PredictionRecord, StorageError};
use thiserror::Error;
use tracing::{debug, info};
use user_auth::{AuthError, Session};

/// Number of features listed alongside a result
pub const TOP_FEATURES: usize = 6;

/// Failures of a single analysis
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What a completed analysis hands back
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    /// The record as appended to the history log
    pub record: PredictionRecord,
    pub stress_level: StressLevel,
    pub advice: &'static str,
    /// Most influential features; empty when the model has no importances
    pub top_features: Vec<FeatureImportance>,
    pub confidence: f64,
    /// Set when the synthetic fallback model produced the label
    pub used_fallback: bool,
}

/// Run one analysis for the logged-in user
pub fn analyze(
    session: &Session,
    raw: &HashMap<String, f64>,
    engine: &InferenceEngine,
    history: &HistoryLog,
) -> Result<AnalysisOutcome, WorkflowError> {
    let username = session.require_user()?;
    let features = encode(raw)?;

    let result = engine.predict(&features.as_f64())?;
    let prediction = result.prediction;
    debug!(
        "Predicted {} for {} in {}us",
        prediction.stress_level, username, result.latency_us
    );

    let record = PredictionRecord::new(username, prediction.stress_level, features, Utc::now());
    history.append(&record)?;
    info!("Recorded {} analysis for {}", prediction.stress_level, username);

    Ok(AnalysisOutcome {
        stress_level: prediction.stress_level,
        advice: prediction.stress_level.advice(),
        top_features: prediction.top_features(TOP_FEATURES),
        confidence: prediction.confidence,
        used_fallback: result.used_fallback,
        record,
    })
}
