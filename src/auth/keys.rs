//! Login keys: `<kind>:<value>` strings that resolve to exactly one user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::{
    error::{ErrorKind, Result},
    utils::normalize_email,
};

pub const KIND_USERNAME: &str = "username";
pub const KIND_EMAIL: &str = "email";
/// Addresses the users row directly; never stored in the keys table.
pub const KIND_ID: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyId(String);

impl KeyId {
    /// Build the canonical composite key for `kind` and `value`.
    ///
    /// The kind is lowercased, the value trimmed; email values are
    /// lowercased as well.
    ///
    /// # Errors
    /// Returns `InvalidInput` for an empty kind or value, or a kind containing `:`.
    pub fn build(kind: &str, value: &str) -> Result<Self> {
        let kind = kind.trim().to_lowercase();
        if kind.is_empty() || kind.contains(':') {
            return Err(ErrorKind::InvalidInput
                .coded("invalid_key")
                .hint("key kind must be non-empty and must not contain ':'"));
        }

        let value = if kind == KIND_EMAIL {
            normalize_email(value)
        } else {
            value.trim().to_string()
        };
        if value.is_empty() {
            return Err(ErrorKind::InvalidInput
                .coded("invalid_key")
                .hint("key value must be non-empty"));
        }

        Ok(Self(format!("{kind}:{value}")))
    }

    /// Parse an already composed key, re-normalizing it.
    ///
    /// # Errors
    /// Returns `InvalidInput` if there is no `:` separator.
    pub fn parse(composite: &str) -> Result<Self> {
        let (kind, value) = composite.split_once(':').ok_or_else(|| {
            ErrorKind::InvalidInput
                .coded("invalid_key")
                .hint("key must look like <kind>:<value>")
        })?;
        Self::build(kind, value)
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        self.0.split_once(':').map_or("", |(kind, _)| kind)
    }

    #[must_use]
    pub fn value(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, value)| value)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for KeyId {
    type Error = super::error::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<KeyId> for String {
    fn from(key: KeyId) -> Self {
        key.0
    }
}

/// Per-key metadata, tagged so stored rows stay self-describing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyAttribs {
    /// Username or email used for password login.
    #[default]
    Login,
    #[serde(rename = "oauth2")]
    OAuth2(OAuth2Attribs),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Attribs {
    pub provider: String,
    pub external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub raw_data: Map<String, Value>,
}

/// A key to bind to a user at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub key: KeyId,
    pub attribs: KeyAttribs,
}

impl Key {
    #[must_use]
    pub fn login(key: KeyId) -> Self {
        Self {
            key,
            attribs: KeyAttribs::Login,
        }
    }
}
