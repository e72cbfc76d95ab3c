//! History Routes

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use storage::{analytics, export_csv, PredictionRecord, Summary};

use crate::{ApiError, SharedState};

/// Whose records to show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// The caller's own records
    #[default]
    Mine,
    /// Every user's records
    All,
}

/// Query parameters for history endpoint
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub scope: Scope,
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for history endpoint
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub scope: Scope,
    /// Newest first, at most `limit`
    pub data: Vec<PredictionRecord>,
    pub count: usize,
    /// Figures over the whole scope, not just `data`
    pub summary: Summary,
}

/// Get prediction history with summary analytics
pub async fn get_history(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let state = state.read().await;
    let session = state.session(&headers);
    let username = session.require_user()?;
    let limit = params.limit.min(500);

    let records = match params.scope {
        Scope::Mine => state.history.read_by_user(username)?,
        Scope::All => state.history.read_all()?.collect::<Result<Vec<_>, _>>()?,
    };
    let summary = analytics::summarize(&records, Utc::now(), state.config.window_days);

    let data: Vec<PredictionRecord> = records.into_iter().rev().take(limit).collect();
    Ok(Json(HistoryResponse {
        scope: params.scope,
        count: data.len(),
        data,
        summary,
    }))
}

/// Download history as CSV: the full log for admins, own rows otherwise
pub async fn export_history(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let state = state.read().await;
    let session = state.session(&headers);
    let username = session.require_user()?;

    let records = if session.is_admin() {
        state.history.read_all()?.collect::<Result<Vec<_>, _>>()?
    } else {
        state.history.read_by_user(username)?
    };
    let body = export_csv(&records)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"history.csv\""),
        ],
        body,
    ))
}
