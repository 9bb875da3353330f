//! User record and its public projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    keys::{KeyId, KIND_EMAIL, KIND_USERNAME},
    password,
};

pub const DEFAULT_USER_KIND: &str = "standard";

/// Free-form profile data, versioned by its `schema` tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum UserData {
    #[default]
    Empty,
    ProfileV1(Profile),
}

/// Profile captured from an external identity provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick_name: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub kind: String,
    pub username: Option<String>,
    pub email: Option<String>,
    /// PHC string; absent when password login is disabled for the user.
    pub password_hash: Option<String>,
    pub data: UserData,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl User {
    /// New unsaved user with a time-ordered id.
    #[must_use]
    pub fn new(kind: &str, username: Option<String>, email: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind: kind.to_string(),
            username,
            email,
            password_hash: None,
            data: UserData::Empty,
            created_at: Utc::now(),
            verified_at: None,
        }
    }

    /// Keys for password login: one per supplied username/email, and only
    /// when the user has a password at all.
    #[must_use]
    pub fn login_keys(&self) -> Vec<KeyId> {
        if self.password_hash.is_none() {
            return Vec::new();
        }
        [
            (KIND_USERNAME, self.username.as_deref()),
            (KIND_EMAIL, self.email.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, value)| KeyId::build(kind, value?).ok())
        .collect()
    }

    /// Compare against the stored hash; users without a password never match.
    #[must_use]
    pub fn check_password(&self, plaintext: &str) -> bool {
        match self.password_hash.as_deref() {
            Some(hash) => password::verify(plaintext, hash),
            None => password::verify_absent(plaintext),
        }
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }

    /// Project into the client-facing shape. Private projections add the
    /// profile data and verification time; the password hash never leaves.
    #[must_use]
    pub fn to_public(&self, include_private: bool) -> PublicUser {
        let data = match (&self.data, include_private) {
            (UserData::ProfileV1(_), true) => serde_json::to_value(&self.data).ok(),
            _ => None,
        };
        PublicUser {
            id: self.id,
            kind: self.kind.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            created_at: self.created_at,
            verified_at: if include_private { self.verified_at } else { None },
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PublicUser {
    pub id: Uuid,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
}
