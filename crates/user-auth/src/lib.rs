//! User Authentication Module
//!
//! Username/password accounts for the stress analyzer:
//! - Credential store persisted as CSV
//! - Salted SHA-256 password hashes (legacy unsalted hashes are upgraded on login)
//! - Explicit login session values

mod password;
mod session;
mod store;

pub use password::{format_of, hash_password, verify_password, HashFormat};
pub use session::{AuthController, Session};
pub use store::{CredentialStore, Role, User};

use storage::StorageError;
use thiserror::Error;

/// Authentication error types
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Username {0} is already taken")]
    UsernameTaken(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("User {0} not found")]
    NotFound(String),

    #[error("Username and password are required")]
    EmptyCredentials,

    #[error("Login required")]
    NotLoggedIn,

    #[error("Admin role required")]
    Forbidden,

    #[error("Credential store error: {0}")]
    Storage(#[from] StorageError),
}

impl From<csv::Error> for AuthError {
    fn from(e: csv::Error) -> Self {
        AuthError::Storage(StorageError::Csv(e))
    }
}
