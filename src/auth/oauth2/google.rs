//! Google: authorization code + PKCE against the OpenID userinfo endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{
    client::OAuth2App,
    provider::{ExternalUser, Provider, ProviderSession},
};
use crate::auth::{config::OAuth2AppConfig, error::Result, utils::normalize_email};

pub const NAME: &str = "google";

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const DEFAULT_SCOPES: &[&str] = &["openid", "email", "profile"];

#[derive(Debug, Deserialize)]
struct GoogleUser {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    given_name: Option<String>,
    picture: Option<String>,
}

impl GoogleUser {
    // Unverified addresses are not trusted as identity.
    fn trusted_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .filter(|_| self.email_verified)
            .map(normalize_email)
    }
}

pub struct Google {
    app: OAuth2App,
}

impl Google {
    /// # Errors
    /// Returns an error if the client cannot be configured.
    pub fn new(app: &OAuth2AppConfig, callback_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            app: OAuth2App::new(
                NAME,
                app,
                AUTH_URL,
                TOKEN_URL,
                callback_url,
                DEFAULT_SCOPES,
                timeout,
            )?,
        })
    }
}

#[async_trait]
impl Provider for Google {
    fn name(&self) -> &str {
        NAME
    }

    fn begin_auth(&self, state: &str) -> Result<ProviderSession> {
        Ok(self.app.begin(state))
    }

    async fn authorize(&self, session: &ProviderSession, code: &str) -> Result<ExternalUser> {
        let tokens = self.app.exchange(session, code).await?;
        let (user, raw): (GoogleUser, Value) =
            self.app.get_json(USERINFO_URL, &tokens.access_token).await?;

        Ok(ExternalUser {
            provider: NAME.to_string(),
            email: user.trusted_email(),
            user_id: user.sub,
            name: user.name,
            nick_name: user.given_name,
            avatar_url: user.picture,
            location: None,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
            raw_data: match raw {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
        })
    }
}
