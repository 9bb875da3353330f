//! User store: users plus the keys that resolve to them.
//!
//! Registration is all-or-nothing: either the user and every one of its
//! keys are persisted, or nothing is.

use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

use super::{
    error::{Error, ErrorKind, Result},
    keys::{Key, KeyId, KIND_ID},
    models::User,
};

#[cfg(test)]
pub(crate) mod memory;
mod postgres;

pub use postgres::PgStore;

/// Idempotent DDL applied at startup.
pub const SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist `user` with its login keys plus `extra_keys`.
    ///
    /// # Errors
    /// `Conflict` (with a `key` attrib) if any key is taken, `InvalidInput`
    /// if the user would have no key at all.
    async fn register(&self, user: User, extra_keys: Vec<Key>) -> Result<User>;

    /// # Errors
    /// `NotFound` when no user owns `key`.
    async fn resolve(&self, key: &KeyId) -> Result<Uuid>;

    /// # Errors
    /// `NotFound` when no such user exists.
    async fn get_by_id(&self, id: Uuid) -> Result<User>;

    /// Store a fresh verification token hash and return the raw token.
    ///
    /// # Errors
    /// `NotFound` when no such user exists.
    async fn issue_verification(&self, id: Uuid) -> Result<String>;

    /// Mark the user verified if `token` matches the pending one.
    ///
    /// # Errors
    /// `NotFound` for an unknown user or a wrong/consumed token.
    async fn verify(&self, id: Uuid, token: &str) -> Result<User>;

    /// # Errors
    /// `InternalIssue` when the backend is unreachable.
    async fn ping(&self) -> Result<()>;

    /// Fetch by any key; `id:<uuid>` addresses the users row directly.
    ///
    /// # Errors
    /// `NotFound` when the key does not resolve.
    async fn get(&self, key: &KeyId) -> Result<User> {
        let id = if key.kind() == KIND_ID {
            Uuid::parse_str(key.value())
                .map_err(|_| ErrorKind::NotFound.hint("user not found"))?
        } else {
            self.resolve(key).await?
        };
        self.get_by_id(id).await
    }
}

/// Every key a registration will insert, validated up front.
pub(crate) fn registration_keys(user: &User, extra_keys: Vec<Key>) -> Result<Vec<Key>> {
    if user.kind.trim().is_empty() {
        return Err(ErrorKind::InvalidInput.hint("user kind is required"));
    }

    let mut keys: Vec<Key> = user.login_keys().into_iter().map(Key::login).collect();
    keys.extend(extra_keys);

    let mut seen = HashSet::new();
    for key in &keys {
        if key.key.kind() == KIND_ID {
            return Err(ErrorKind::InvalidInput.hint("id keys cannot be registered"));
        }
        if !seen.insert(key.key.as_str()) {
            return Err(conflict(&key.key));
        }
    }

    if keys.is_empty() {
        return Err(ErrorKind::InvalidInput.hint("username or email is required"));
    }

    Ok(keys)
}

pub(crate) fn conflict(key: &KeyId) -> Error {
    ErrorKind::Conflict
        .hint("login is already taken")
        .with_attrib("key", key.as_str())
}

pub(crate) fn not_found() -> Error {
    ErrorKind::NotFound.hint("user not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        keys::{KeyAttribs, OAuth2Attribs},
        models::DEFAULT_USER_KIND,
    };

    fn oauth_key(id: &str) -> Key {
        Key {
            key: KeyId::build("github", id).expect("valid key"),
            attribs: KeyAttribs::OAuth2(OAuth2Attribs {
                provider: "github".into(),
                external_id: id.into(),
                expires_at: None,
                access_token: "at".into(),
                refresh_token: None,
                raw_data: serde_json::Map::new(),
            }),
        }
    }

    #[test]
    fn keyless_user_is_rejected() {
        let user = User::new(DEFAULT_USER_KIND, None, Some("a@example.com".into()));
        let err = registration_keys(&user, Vec::new()).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::InvalidInput));
    }

    #[test]
    fn extra_key_alone_is_enough() {
        let user = User::new(DEFAULT_USER_KIND, None, Some("a@example.com".into()));
        let keys = registration_keys(&user, vec![oauth_key("123")]).unwrap_or_default();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].key.as_str(), "github:123");
    }

    #[test]
    fn duplicate_keys_conflict() {
        let user = User::new(DEFAULT_USER_KIND, None, None);
        let err = registration_keys(&user, vec![oauth_key("1"), oauth_key("1")]).err();
        assert_eq!(err.as_ref().map(|e| e.kind()), Some(ErrorKind::Conflict));
        assert_eq!(err.as_ref().and_then(|e| e.attrib("key")), Some("github:1"));
    }

    #[test]
    fn id_keys_are_rejected() {
        let user = User::new(DEFAULT_USER_KIND, None, None);
        let id = Uuid::now_v7().to_string();
        let key = Key::login(KeyId::build(KIND_ID, &id).expect("valid key"));
        assert!(registration_keys(&user, vec![key]).is_err());
    }
}
