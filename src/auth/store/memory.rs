//! In-process store used by handler tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{conflict, not_found, registration_keys, UserStore};
use crate::auth::{
    error::{ErrorKind, Result},
    keys::{Key, KeyAttribs, KeyId},
    models::User,
    utils::{hash_token, random_token},
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, (User, Option<Vec<u8>>)>,
    keys: HashMap<String, (Uuid, KeyAttribs)>,
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
    offline: std::sync::atomic::AtomicBool,
    // Key lookups miss while writes still see every key, like a concurrent
    // registration that committed after our read.
    stale_reads: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub(crate) async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }

    pub(crate) async fn keys_of(&self, user_id: Uuid) -> Vec<Key> {
        let state = self.state.lock().await;
        let mut keys: Vec<Key> = state
            .keys
            .iter()
            .filter(|(_, (owner, _))| *owner == user_id)
            .filter_map(|(key, (_, attribs))| {
                Some(Key {
                    key: KeyId::parse(key).ok()?,
                    attribs: attribs.clone(),
                })
            })
            .collect();
        keys.sort_by(|a, b| a.key.cmp(&b.key));
        keys
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline
            .store(offline, std::sync::atomic::Ordering::SeqCst);
    }

    pub(crate) fn set_stale_reads(&self, stale: bool) {
        self.stale_reads
            .store(stale, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn register(&self, user: User, extra_keys: Vec<Key>) -> Result<User> {
        let keys = registration_keys(&user, extra_keys)?;
        let mut state = self.state.lock().await;

        if let Some(taken) = keys.iter().find(|k| state.keys.contains_key(k.key.as_str())) {
            return Err(conflict(&taken.key));
        }
        for key in keys {
            state
                .keys
                .insert(key.key.to_string(), (user.id, key.attribs));
        }
        state.users.insert(user.id, (user.clone(), None));
        Ok(user)
    }

    async fn resolve(&self, key: &KeyId) -> Result<Uuid> {
        if self.stale_reads.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(not_found());
        }
        let state = self.state.lock().await;
        state
            .keys
            .get(key.as_str())
            .map(|(id, _)| *id)
            .ok_or_else(not_found)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User> {
        let state = self.state.lock().await;
        state
            .users
            .get(&id)
            .map(|(user, _)| user.clone())
            .ok_or_else(not_found)
    }

    async fn issue_verification(&self, id: Uuid) -> Result<String> {
        let token = random_token(32)?;
        let mut state = self.state.lock().await;
        let (_, pending) = state.users.get_mut(&id).ok_or_else(not_found)?;
        *pending = Some(hash_token(&token));
        Ok(token)
    }

    async fn verify(&self, id: Uuid, token: &str) -> Result<User> {
        let mut state = self.state.lock().await;
        let (user, pending) = state.users.get_mut(&id).ok_or_else(not_found)?;
        if pending.as_deref() != Some(hash_token(token).as_slice()) {
            return Err(not_found());
        }
        *pending = None;
        user.verified_at = Some(Utc::now());
        Ok(user.clone())
    }

    async fn ping(&self) -> Result<()> {
        if self.offline.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ErrorKind::InternalIssue.hint("store offline"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{keys::KIND_ID, models::DEFAULT_USER_KIND, password};

    fn password_user(username: Option<&str>, email: Option<&str>) -> User {
        let mut user = User::new(
            DEFAULT_USER_KIND,
            username.map(str::to_string),
            email.map(str::to_string),
        );
        user.password_hash = password::hash("pw").ok();
        user
    }

    #[tokio::test]
    async fn register_then_resolve_each_key() {
        let store = MemoryStore::default();
        let user = password_user(Some("alice"), Some("alice@example.com"));
        let id = user.id;
        assert!(store.register(user, Vec::new()).await.is_ok());

        for key in ["username:alice", "email:alice@example.com"] {
            let key = KeyId::parse(key).expect("valid key");
            assert_eq!(store.resolve(&key).await.ok(), Some(id));
        }
        let by_id = KeyId::build(KIND_ID, &id.to_string()).expect("valid key");
        assert_eq!(store.get(&by_id).await.ok().map(|u| u.id), Some(id));
    }

    #[tokio::test]
    async fn conflicting_registration_leaves_nothing_behind() {
        let store = MemoryStore::default();
        let first = password_user(None, Some("a@example.com"));
        assert!(store.register(first, Vec::new()).await.is_ok());

        let second = password_user(Some("bob"), Some("a@example.com"));
        let err = store.register(second, Vec::new()).await.err();
        assert_eq!(err.as_ref().map(|e| e.kind()), Some(ErrorKind::Conflict));
        assert_eq!(
            err.as_ref().and_then(|e| e.attrib("key")),
            Some("email:a@example.com")
        );

        assert_eq!(store.user_count().await, 1);
        let bob = KeyId::parse("username:bob").expect("valid key");
        assert!(store.resolve(&bob).await.is_err());
    }

    #[tokio::test]
    async fn unknown_key_is_not_found() {
        let store = MemoryStore::default();
        let key = KeyId::parse("email:nobody@example.com").expect("valid key");
        let err = store.resolve(&key).await.err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn verification_token_is_single_use() {
        let store = MemoryStore::default();
        let user = password_user(None, Some("v@example.com"));
        let id = user.id;
        assert!(store.register(user, Vec::new()).await.is_ok());

        let token = store.issue_verification(id).await.unwrap_or_default();
        assert!(store.verify(id, "wrong").await.is_err());

        let verified = store.verify(id, &token).await.ok();
        assert!(verified.is_some_and(|u| u.is_verified()));
        assert!(store.verify(id, &token).await.is_err());
    }
}
