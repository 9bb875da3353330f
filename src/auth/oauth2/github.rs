//! GitHub: authorization code + PKCE, then `/user` with a `/user/emails`
//! fallback when the profile hides the address.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use super::{
    client::OAuth2App,
    provider::{ExternalUser, Provider, ProviderSession},
};
use crate::auth::{config::OAuth2AppConfig, error::Result, utils::normalize_email};

pub const NAME: &str = "github";

const AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";
const DEFAULT_SCOPES: &[&str] = &["read:user", "user:email"];

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

pub struct GitHub {
    app: OAuth2App,
}

impl GitHub {
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

    async fn primary_email(&self, access_token: &str) -> Result<Option<String>> {
        let (emails, _): (Vec<GitHubEmail>, Value) =
            self.app.get_json(EMAILS_URL, access_token).await?;
        Ok(pick_primary(emails))
    }
}

// The address is optional profile data; a failed lookup (e.g. scopes without
// `user:email`) must not abort the login.
fn email_or_none(lookup: Result<Option<String>>) -> Option<String> {
    match lookup {
        Ok(email) => email,
        Err(err) => {
            warn!("github: continuing without email, {EMAILS_URL} failed: {err}");
            None
        }
    }
}

fn pick_primary(emails: Vec<GitHubEmail>) -> Option<String> {
    emails
        .into_iter()
        .find(|e| e.primary && e.verified)
        .map(|e| normalize_email(&e.email))
}

#[async_trait]
impl Provider for GitHub {
    fn name(&self) -> &str {
        NAME
    }

    fn begin_auth(&self, state: &str) -> Result<ProviderSession> {
        Ok(self.app.begin(state))
    }

    async fn authorize(&self, session: &ProviderSession, code: &str) -> Result<ExternalUser> {
        let tokens = self.app.exchange(session, code).await?;
        let (user, raw): (GitHubUser, Value) =
            self.app.get_json(USER_URL, &tokens.access_token).await?;

        let email = match user.email.as_deref().map(normalize_email) {
            Some(email) if !email.is_empty() => Some(email),
            _ => email_or_none(self.primary_email(&tokens.access_token).await),
        };

        Ok(ExternalUser {
            provider: NAME.to_string(),
            user_id: user.id.to_string(),
            email,
            name: user.name,
            nick_name: Some(user.login),
            avatar_url: user.avatar_url,
            location: user.location,
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
