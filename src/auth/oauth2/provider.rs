use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::auth::{
    error::{ErrorKind, Result},
    keys::{Key, KeyAttribs, KeyId, OAuth2Attribs},
    models::{Profile, UserData},
};

/// Provider-side state of one authorization attempt. Travels inside the
/// sealed flow cookie and is handed back to the provider at callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSession {
    pub auth_url: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce_verifier: Option<String>,
}

impl ProviderSession {
    /// # Errors
    /// Returns `InternalIssue` if serialization fails.
    pub fn marshal(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|err| ErrorKind::InternalIssue.hint("failed to marshal provider session").caused_by(err))
    }

    /// # Errors
    /// Returns `InvalidInput` coded `invalid_callback` for an unreadable blob.
    pub fn unmarshal(blob: &str) -> Result<Self> {
        serde_json::from_str(blob).map_err(|err| {
            ErrorKind::InvalidInput
                .coded("invalid_callback")
                .hint("provider session is unreadable")
                .caused_by(err)
        })
    }
}

/// Identity as reported by the provider after a successful exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalUser {
    pub provider: String,
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub nick_name: Option<String>,
    pub avatar_url: Option<String>,
    pub location: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub raw_data: Map<String, Value>,
}

impl ExternalUser {
    /// `<provider>:<external id>`
    ///
    /// # Errors
    /// Returns `InternalIssue` when the provider reported no usable id.
    pub fn key_id(&self) -> Result<KeyId> {
        KeyId::build(&self.provider, &self.user_id).map_err(|err| {
            ErrorKind::InternalIssue
                .hint("provider returned an unusable identity")
                .caused_by(err)
        })
    }

    /// # Errors
    /// See [`ExternalUser::key_id`].
    pub fn key(&self) -> Result<Key> {
        Ok(Key {
            key: self.key_id()?,
            attribs: KeyAttribs::OAuth2(OAuth2Attribs {
                provider: self.provider.clone(),
                external_id: self.user_id.clone(),
                expires_at: self.expires_at,
                access_token: self.access_token.clone(),
                refresh_token: self.refresh_token.clone(),
                raw_data: self.raw_data.clone(),
            }),
        })
    }

    #[must_use]
    pub fn profile(&self) -> UserData {
        UserData::ProfileV1(Profile {
            provider: self.provider.clone(),
            name: self.name.clone(),
            picture: self.avatar_url.clone(),
            location: self.location.clone(),
            nick_name: self.nick_name.clone(),
            extra: Map::new(),
        })
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry name, also the key kind for identities it returns.
    fn name(&self) -> &str;

    /// Start an authorization bound to `state`.
    ///
    /// # Errors
    /// Returns `InternalIssue` if the authorization URL cannot be built.
    fn begin_auth(&self, state: &str) -> Result<ProviderSession>;

    /// # Errors
    /// Returns `InvalidInput` coded `invalid_callback` for an unreadable blob.
    fn unmarshal_session(&self, blob: &str) -> Result<ProviderSession> {
        ProviderSession::unmarshal(blob)
    }

    /// Exchange `code` and fetch the profile.
    ///
    /// # Errors
    /// Any network or provider failure is an `InternalIssue`.
    async fn authorize(&self, session: &ProviderSession, code: &str) -> Result<ExternalUser>;
}

/// Providers by name; built once at startup and read-only afterwards.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
