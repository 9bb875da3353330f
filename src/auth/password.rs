//! Argon2id password hashing.
//!
//! Hashes are stored as PHC strings so parameters travel with the hash.

use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use std::sync::LazyLock;

use super::error::{ErrorKind, Result};

// Hashed with the live parameters so a miss costs the same as a mismatch.
static ABSENT_HASH: LazyLock<Option<String>> = LazyLock::new(|| hash("idgate-absent-user").ok());

/// Hash a plaintext password with a fresh random salt.
///
/// # Errors
/// Returns `InternalIssue` if the hasher fails.
pub fn hash(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ErrorKind::InternalIssue.hint(format!("failed to hash password: {err}")))
}

/// Constant-time comparison of a plaintext against a stored PHC hash.
/// A malformed stored hash never matches.
#[must_use]
pub fn verify(plaintext: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

/// Burn one verification for a login with no stored hash (unknown key or
/// a passwordless user). Always `false`.
#[must_use]
pub fn verify_absent(plaintext: &str) -> bool {
    if let Some(stored) = ABSENT_HASH.as_deref() {
        let _ = verify(plaintext, stored);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hashed = hash("correct horse").unwrap_or_default();
        assert!(hashed.starts_with("$argon2id$"));
        assert!(verify("correct horse", &hashed));
        assert!(!verify("wrong horse", &hashed));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let first = hash("secret").unwrap_or_default();
        let second = hash("secret").unwrap_or_default();
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_hash_never_matches() {
        assert!(!verify("secret", "not-a-phc-string"));
        assert!(!verify("secret", ""));
    }

    #[test]
    fn absent_hash_costs_the_same_as_a_real_one() {
        let params = |phc: &str| phc.split('$').take(4).collect::<Vec<_>>().join("$");
        let live = hash("secret").unwrap_or_default();
        let absent = ABSENT_HASH.clone().unwrap_or_default();
        assert!(absent.starts_with("$argon2id$"));
        assert_eq!(params(&absent), params(&live));

        assert!(!verify_absent("idgate-absent-user"));
        assert!(!verify_absent(""));
    }
}
