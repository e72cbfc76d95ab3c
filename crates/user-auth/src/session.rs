//! Login session controller
//!
//! A session is a plain value: the controller takes the current one and hands
//! back the next. Nothing about the logged-in identity lives in globals.

use crate::store::{CredentialStore, Role};
use crate::AuthError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Interactive session state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Session {
    #[default]
    LoggedOut,
    LoggedIn { username: String, role: Role },
}

impl Session {
    /// Logged-in identity, if any
    pub fn identity(&self) -> Option<(&str, Role)> {
        match self {
            Session::LoggedIn { username, role } => Some((username.as_str(), *role)),
            Session::LoggedOut => None,
        }
    }

    /// Username of a logged-in session
    pub fn require_user(&self) -> Result<&str, AuthError> {
        self.identity()
            .map(|(username, _)| username)
            .ok_or(AuthError::NotLoggedIn)
    }

    /// Username of a logged-in admin session
    pub fn require_admin(&self) -> Result<&str, AuthError> {
        match self.identity() {
            Some((username, Role::Admin)) => Ok(username),
            Some(_) => Err(AuthError::Forbidden),
            None => Err(AuthError::NotLoggedIn),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.identity(), Some((_, Role::Admin)))
    }
}

/// Moves sessions between logged-out and logged-in states
#[derive(Clone)]
pub struct AuthController {
    store: Arc<CredentialStore>,
}

impl AuthController {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    /// Underlying credential store
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Verify credentials and return the logged-in session.
    ///
    /// On failure the caller keeps its current session unchanged.
    pub fn login(&self, current: &Session, username: &str, password: &str) -> Result<Session, AuthError> {
        if let Some((previous, _)) = current.identity() {
            debug!("Replacing session of {}", previous);
        }
        let user = self.store.verify(username, password)?;
        info!("User {} logged in as {}", user.username, user.role.as_str());
        Ok(Session::LoggedIn {
            username: user.username,
            role: user.role,
        })
    }

    /// End the session; always succeeds
    pub fn logout(&self, current: Session) -> Session {
        if let Some((username, _)) = current.identity() {
            info!("User {} logged out", username);
        }
        Session::LoggedOut
    }

    /// Re-read the role of a logged-in session after a promotion
    pub fn refresh(&self, current: Session) -> Result<Session, AuthError> {
        match current {
            Session::LoggedIn { username, .. } => {
                let user = self
                    .store
                    .find(&username)?
                    .ok_or(AuthError::NotFound(username))?;
                Ok(Session::LoggedIn {
                    username: user.username,
                    role: user.role,
                })
            }
            Session::LoggedOut => Ok(Session::LoggedOut),
        }
    }
}
