//! File-backed credential store

use crate::password::{format_of, hash_password, verify_password, HashFormat};
use crate::AuthError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use storage::{write_atomic, StorageError};
use tracing::{debug, info, warn};

/// Account role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Stored account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(rename = "password")]
    pub password_hash: String,
    /// Older stores have no role column
    #[serde(default)]
    pub role: Role,
}

impl User {
    fn matches(&self, username: &str) -> bool {
        self.username.to_lowercase() == username.trim().to_lowercase()
    }
}

/// Username/password-hash table persisted as CSV.
///
/// Every access reads the whole file; every mutation rewrites it atomically
/// before returning.
pub struct CredentialStore {
    path: PathBuf,
    /// Held across each read-modify-write
    lock: Mutex<()>,
}

impl CredentialStore {
    /// Open the store, creating an empty one if the file is absent
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let path = path.into();
        let store = Self {
            path,
            lock: Mutex::new(()),
        };

        if !store.path.exists() {
            info!("Creating credential store at {}", store.path.display());
            store.save(&[])?;
        }
        let count = store.load()?.len();
        info!("Credential store {} holds {} users", store.path.display(), count);
        Ok(store)
    }

    /// Create a user with role `user`
    pub fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::EmptyCredentials);
        }

        let _guard = self.guard()?;
        let mut users = self.load()?;
        if users.iter().any(|u| u.matches(username)) {
            debug!("Registration refused, {} exists", username);
            return Err(AuthError::UsernameTaken(username.to_string()));
        }

        let user = User {
            username: username.to_string(),
            password_hash: hash_password(password),
            role: Role::User,
        };
        users.push(user.clone());
        self.save(&users)?;

        info!("Registered user {}", username);
        Ok(user)
    }

    /// Check credentials; returns the stored account.
    ///
    /// Legacy unsalted hashes are accepted and rewritten in salted form.
    pub fn verify(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let _guard = self.guard()?;
        let mut users = self.load()?;
        let idx = users
            .iter()
            .position(|u| u.matches(username))
            .ok_or(AuthError::InvalidCredentials)?;

        let stored = &users[idx].password_hash;
        if !verify_password(password, stored) {
            if format_of(stored) == HashFormat::Unrecognized {
                warn!("User {} has an unrecognized password format", users[idx].username);
            }
            return Err(AuthError::InvalidCredentials);
        }

        if format_of(stored) == HashFormat::LegacyUnsalted {
            users[idx].password_hash = hash_password(password);
            self.save(&users)?;
            info!("Upgraded password hash for {}", users[idx].username);
        }

        Ok(users.swap_remove(idx))
    }

    /// Grant the admin role; promoting an admin is a no-op
    pub fn promote(&self, username: &str) -> Result<User, AuthError> {
        let _guard = self.guard()?;
        let mut users = self.load()?;
        let user = users
            .iter_mut()
            .find(|u| u.matches(username))
            .ok_or_else(|| AuthError::NotFound(username.to_string()))?;

        if user.role != Role::Admin {
            user.role = Role::Admin;
            let promoted = user.clone();
            self.save(&users)?;
            info!("Promoted {} to admin", promoted.username);
            return Ok(promoted);
        }
        Ok(user.clone())
    }

    /// Look up a user by case-insensitive name
    pub fn find(&self, username: &str) -> Result<Option<User>, AuthError> {
        Ok(self.load()?.into_iter().find(|u| u.matches(username)))
    }

    /// All accounts in file order
    pub fn users(&self) -> Result<Vec<User>, AuthError> {
        self.load()
    }

    /// CSV of usernames and roles; hashes are never exported
    pub fn export_csv(&self) -> Result<String, AuthError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["username", "role"])?;
        for user in self.load()? {
            writer.write_record([user.username.as_str(), user.role.as_str()])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StorageError::Export(e.error().to_string()))?;
        String::from_utf8(bytes).map_err(|e| StorageError::Export(e.to_string()).into())
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, AuthError> {
        self.lock.lock().map_err(|e| {
            StorageError::Io {
                path: self.path.clone(),
                source: std::io::Error::other(format!("Lock error: {}", e)),
            }
            .into()
        })
    }

    fn load(&self) -> Result<Vec<User>, AuthError> {
        let file = File::open(&self.path).map_err(|e| StorageError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        let mut reader = csv::Reader::from_reader(file);
        let mut users = Vec::new();
        for row in reader.deserialize::<User>() {
            users.push(row?);
        }
        Ok(users)
    }

    fn save(&self, users: &[User]) -> Result<(), AuthError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["username", "password", "role"])?;
        for user in users {
            writer.write_record([
                user.username.as_str(),
                user.password_hash.as_str(),
                user.role.as_str(),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StorageError::Export(e.error().to_string()))?;
        write_atomic(&self.path, &bytes).map_err(|e| StorageError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn store() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open(dir.path().join("users.csv")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_register_then_verify() {
        let (_dir, store) = store();
        store.register("Alice", "pw123").unwrap();

        let user = store.verify("Alice", "pw123").unwrap();
        assert_eq!(user.username, "Alice");
        assert_eq!(user.role, Role::User);
        assert!(matches!(store.verify("Alice", "nope"), Err(AuthError::InvalidCredentials)));
        assert!(matches!(store.verify("nobody", "pw123"), Err(AuthError::InvalidCredentials)));
    }

    #[test]
    fn test_username_is_case_insensitive() {
        let (_dir, store) = store();
        store.register("Alice", "pw123").unwrap();

        assert!(matches!(
            store.register("aLiCe", "other"),
            Err(AuthError::UsernameTaken(_))
        ));
        // Login with any casing returns the stored name
        assert_eq!(store.verify("ALICE", "pw123").unwrap().username, "Alice");
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let (_dir, store) = store();
        assert!(matches!(store.register("  ", "pw"), Err(AuthError::EmptyCredentials)));
        assert!(matches!(store.register("bob", ""), Err(AuthError::EmptyCredentials)));
    }

    #[test]
    fn test_promote_is_idempotent() {
        let (_dir, store) = store();
        store.register("bob", "pw").unwrap();

        assert_eq!(store.promote("bob").unwrap().role, Role::Admin);
        assert_eq!(store.promote("BOB").unwrap().role, Role::Admin);
        assert_eq!(store.find("bob").unwrap().unwrap().role, Role::Admin);
        assert!(matches!(store.promote("ghost"), Err(AuthError::NotFound(_))));
    }

    #[test]
    fn test_mutations_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        {
            let store = CredentialStore::open(&path).unwrap();
            store.register("carol", "secret").unwrap();
            store.promote("carol").unwrap();
        }
        let reopened = CredentialStore::open(&path).unwrap();
        let user = reopened.verify("carol", "secret").unwrap();
        assert_eq!(user.role, Role::Admin);
        assert!(!fs::read_to_string(&path).unwrap().contains("secret"));
    }

    #[test]
    fn test_legacy_file_without_role_and_unsalted_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        fs::write(
            &path,
            "username,password\nAyush,03ac674216f3e15c761ee1a5e255f067953623c8b388b4459e13f978d7c846f4\n",
        )
        .unwrap();

        let store = CredentialStore::open(&path).unwrap();
        let user = store.verify("ayush", "1234").unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(format_of(&user.password_hash), HashFormat::Salted);

        // Upgraded hash is persisted and still verifies
        let stored = store.find("Ayush").unwrap().unwrap();
        assert_eq!(format_of(&stored.password_hash), HashFormat::Salted);
        assert!(store.verify("Ayush", "1234").is_ok());
    }

    #[test]
    fn test_plaintext_row_never_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        fs::write(&path, "username,password,role\nmallory,letmein,admin\n").unwrap();

        let store = CredentialStore::open(&path).unwrap();
        assert!(matches!(
            store.verify("mallory", "letmein"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_export_omits_hashes() {
        let (_dir, store) = store();
        store.register("dan", "pw").unwrap();
        let csv = store.export_csv().unwrap();
        assert_eq!(csv.lines().collect::<Vec<_>>(), vec!["username,role", "dan,user"]);
    }
}
