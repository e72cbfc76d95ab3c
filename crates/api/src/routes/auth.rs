//! Account and Session Routes

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use user_auth::{AuthError, Role, Session};
use uuid::Uuid;

use crate::{bearer_token, ApiError, SharedState};

/// Username and password body
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Account as shown to clients
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub username: String,
    pub role: Role,
}

/// Response for a successful login
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Bearer token for subsequent requests
    pub token: Uuid,
    pub username: String,
    pub role: Role,
}

/// Create an account
pub async fn register(
    State(state): State<SharedState>,
    Json(body): Json<Credentials>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let state = state.read().await;
    let user = state.auth.store().register(&body.username, &body.password)?;
    metrics::counter!("registrations_total").increment(1);

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            username: user.username,
            role: user.role,
        }),
    ))
}

/// Log in and issue a bearer token
pub async fn login(
    State(state): State<SharedState>,
    Json(body): Json<Credentials>,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut state = state.write().await;
    let session = state
        .auth
        .login(&Session::LoggedOut, &body.username, &body.password)?;
    metrics::counter!("logins_total").increment(1);

    let Session::LoggedIn { username, role } = session.clone() else {
        return Err(AuthError::InvalidCredentials.into());
    };
    let token = Uuid::new_v4();
    state.sessions.insert(token, session);

    Ok(Json(LoginResponse { token, username, role }))
}

/// Drop the caller's token; always succeeds
pub async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> StatusCode {
    let mut state = state.write().await;
    if let Some(session) = bearer_token(&headers).and_then(|token| state.sessions.remove(&token)) {
        state.auth.logout(session);
    }
    StatusCode::NO_CONTENT
}

/// Current identity
pub async fn current_session(State(state): State<SharedState>, headers: HeaderMap) -> Json<Session> {
    let state = state.read().await;
    let session = state.session(&headers);
    if let Some((username, _)) = session.identity() {
        debug!("Session lookup for {}", username);
    }
    Json(session)
}
