//! Admin Routes

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use inference_engine::ModelSource;
use serde::Serialize;
use tracing::info;

use crate::routes::auth::AccountResponse;
use crate::{ApiError, SharedState};

/// Response for the user listing
#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub data: Vec<AccountResponse>,
    pub count: usize,
}

/// Response after a model upload
#[derive(Debug, Serialize)]
pub struct ModelResponse {
    pub source: ModelSource,
    pub classifier: &'static str,
}

/// List every account
pub async fn list_users(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<UsersResponse>, ApiError> {
    let state = state.read().await;
    state.session(&headers).require_admin()?;

    let data: Vec<AccountResponse> = state
        .auth
        .store()
        .users()?
        .into_iter()
        .map(|user| AccountResponse {
            username: user.username,
            role: user.role,
        })
        .collect();

    Ok(Json(UsersResponse {
        count: data.len(),
        data,
    }))
}

/// Download the user table (no password hashes)
pub async fn export_users(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let state = state.read().await;
    state.session(&headers).require_admin()?;
    let body = state.auth.store().export_csv()?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"users.csv\""),
        ],
        body,
    ))
}

/// Grant the admin role; open sessions of that user pick it up immediately
pub async fn promote_user(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let mut state = state.write().await;
    let admin = state.session(&headers).require_admin()?.to_string();

    let user = state.auth.store().promote(&username)?;
    info!("{} promoted {} to admin", admin, user.username);

    let auth = state.auth.clone();
    for session in state.sessions.values_mut() {
        if matches!(session.identity(), Some((name, _)) if name == user.username) {
            *session = auth.refresh(std::mem::take(session))?;
        }
    }

    Ok(Json(AccountResponse {
        username: user.username,
        role: user.role,
    }))
}

/// Replace the classifier with an uploaded postcard blob
pub async fn upload_model(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ModelResponse>, ApiError> {
    let mut state = state.write().await;
    state.session(&headers).require_admin()?;

    state.engine.replace_classifier(&body)?;

    Ok(Json(ModelResponse {
        source: state.engine.source().clone(),
        classifier: state.engine.artifact().classifier.kind(),
    }))
}
