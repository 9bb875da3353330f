//! Normalization and random token helpers.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use super::error::{ErrorKind, Result};

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Lowercase and trim an email so lookups and uniqueness agree.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic shape check on an already normalized email.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

/// URL-safe random token of `len` bytes of entropy.
///
/// # Errors
/// Returns `InternalIssue` if the OS random source fails.
pub fn random_token(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| ErrorKind::InternalIssue.hint(format!("failed to read random bytes: {err}")))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// SHA-256 of a token; only the digest is persisted.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

/// Trimmed value, or `None` when blank.
#[must_use]
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
