//! Analysis Routes

use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use feature_codec::{validate, FeatureKind, FEATURES};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::workflow::{analyze, AnalysisOutcome};
use crate::{ApiError, SharedState};

/// One form field
#[derive(Debug, Serialize)]
pub struct FeatureField {
    pub name: &'static str,
    pub kind: FeatureKind,
    pub min: i64,
    pub max: i64,
    pub default: u8,
}

/// Response for the features endpoint
#[derive(Debug, Serialize)]
pub struct FeaturesResponse {
    pub data: Vec<FeatureField>,
    pub count: usize,
}

/// Analysis request body
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Raw answers keyed by feature name
    pub features: HashMap<String, f64>,
}

/// List the inputs in canonical order
pub async fn get_features() -> Json<FeaturesResponse> {
    let data: Vec<FeatureField> = FEATURES
        .iter()
        .map(|spec| {
            let (min, max) = spec.kind.range();
            FeatureField {
                name: spec.name,
                kind: spec.kind,
                min,
                max,
                default: spec.kind.default_value(),
            }
        })
        .collect();

    Json(FeaturesResponse {
        count: data.len(),
        data,
    })
}

/// Analyze one submission for the caller
pub async fn post_analyze(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisOutcome>, ApiError> {
    let state = state.read().await;
    let session = state.session(&headers);
    session.require_user()?;

    let check = validate(&body.features);
    if !check.valid {
        metrics::counter!("analysis_errors_total").increment(1);
        return Err(ApiError::InvalidInput(check.errors));
    }

    match analyze(&session, &body.features, &state.engine, &state.history) {
        Ok(outcome) => {
            metrics::counter!("analyses_total", "level" => outcome.stress_level.as_str()).increment(1);
            Ok(Json(outcome))
        }
        Err(e) => {
            metrics::counter!("analysis_errors_total").increment(1);
            Err(e.into())
        }
    }
}
