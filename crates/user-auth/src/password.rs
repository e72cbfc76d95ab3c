//! Salted password hashing

use rand::RngCore;
use sha2::{Digest, Sha256};

const SCHEME: &str = "sha256";
const SALT_BYTES: usize = 16;

/// How a stored password value was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashFormat {
    /// `sha256$<salt>$<digest>`
    Salted,
    /// Bare unsalted SHA-256 hex digest from older stores
    LegacyUnsalted,
    /// Anything else, including plaintext; never verifies
    Unrecognized,
}

/// Classify a stored password value
pub fn format_of(stored: &str) -> HashFormat {
    if stored.split('$').count() == 3 && stored.starts_with(SCHEME) {
        HashFormat::Salted
    } else if stored.len() == 64 && stored.bytes().all(|b| b.is_ascii_hexdigit()) {
        HashFormat::LegacyUnsalted
    } else {
        HashFormat::Unrecognized
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = to_hex(&salt);
    format!("{}${}${}", SCHEME, salt, digest(&salt, password))
}

/// Check a password against a stored value
pub fn verify_password(password: &str, stored: &str) -> bool {
    match format_of(stored) {
        HashFormat::Salted => {
            let mut parts = stored.splitn(3, '$');
            let (_, salt, expected) = (parts.next(), parts.next(), parts.next());
            match (salt, expected) {
                (Some(salt), Some(expected)) => digest(salt, password) == expected,
                _ => false,
            }
        }
        HashFormat::LegacyUnsalted => digest("", password).eq_ignore_ascii_case(stored),
        HashFormat::Unrecognized => false,
    }
}
