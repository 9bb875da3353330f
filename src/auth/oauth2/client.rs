//! Authorization-code + PKCE plumbing shared by the concrete providers.

use chrono::{Duration as ChronoDuration, Utc};
use oauth2::{
    basic::{BasicClient, BasicTokenResponse},
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{info_span, Instrument};

use super::provider::ProviderSession;
use crate::{
    auth::{
        config::OAuth2AppConfig,
        error::{ErrorKind, Result},
    },
    APP_USER_AGENT,
};

type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Tokens from a successful code exchange.
#[derive(Debug, Clone)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

pub struct OAuth2App {
    provider: &'static str,
    client: ConfiguredClient,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl OAuth2App {
    /// # Errors
    /// Returns `InvalidInput` for malformed endpoint URLs, `InternalIssue`
    /// if the HTTP client cannot be built.
    pub fn new(
        provider: &'static str,
        app: &OAuth2AppConfig,
        auth_url: &str,
        token_url: &str,
        redirect_url: &str,
        default_scopes: &[&str],
        timeout: Duration,
    ) -> Result<Self> {
        let invalid = |what: &str| {
            let hint = format!("{provider}: invalid {what}");
            move |err: url::ParseError| ErrorKind::InvalidInput.hint(hint).caused_by(err)
        };

        let client = BasicClient::new(ClientId::new(app.client_id.clone()))
            .set_client_secret(ClientSecret::new(
                app.client_secret.expose_secret().to_string(),
            ))
            .set_auth_uri(AuthUrl::new(auth_url.to_string()).map_err(invalid("auth url"))?)
            .set_token_uri(TokenUrl::new(token_url.to_string()).map_err(invalid("token url"))?)
            .set_redirect_uri(
                RedirectUrl::new(redirect_url.to_string()).map_err(invalid("redirect url"))?,
            );

        // Token endpoints must not be followed through redirects.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| ErrorKind::InternalIssue.hint("failed to build HTTP client").caused_by(err))?;

        let scopes = if app.scopes.is_empty() {
            default_scopes.iter().map(ToString::to_string).collect()
        } else {
            app.scopes.clone()
        };

        Ok(Self {
            provider,
            client,
            scopes,
            http,
        })
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn begin(&self, state: &str) -> ProviderSession {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let csrf = state.to_string();
        let (url, _) = self
            .client
            .authorize_url(|| CsrfToken::new(csrf))
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(challenge)
            .url();

        ProviderSession {
            auth_url: url.to_string(),
            state: state.to_string(),
            pkce_verifier: Some(verifier.secret().clone()),
        }
    }

    /// # Errors
    /// Returns `InternalIssue` when the token endpoint rejects the code.
    pub async fn exchange(&self, session: &ProviderSession, code: &str) -> Result<Tokens> {
        let mut request = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()));
        if let Some(verifier) = &session.pkce_verifier {
            request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.clone()));
        }

        let span = info_span!("oauth2.exchange", provider = self.provider);
        let token: BasicTokenResponse = request
            .request_async(&self.http)
            .instrument(span)
            .await
            .map_err(|err| {
                ErrorKind::InternalIssue
                    .hint(format!("{}: token exchange failed", self.provider))
                    .caused_by(err.to_string())
            })?;

        Ok(Tokens {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            expires_at: token.expires_in().and_then(|ttl| {
                ChronoDuration::from_std(ttl).ok().map(|ttl| Utc::now() + ttl)
            }),
        })
    }

    /// Authenticated GET returning both the typed and the raw JSON body.
    ///
    /// # Errors
    /// Returns `InternalIssue` on transport errors, non-2xx statuses or bad JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<(T, serde_json::Value)> {
        let fail = |what: &str| {
            let hint = format!("{}: {what} from {url}", self.provider);
            move |err: reqwest::Error| ErrorKind::InternalIssue.hint(hint).caused_by(err)
        };

        let span = info_span!("oauth2.profile", provider = self.provider, url);
        let raw: serde_json::Value = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .instrument(span)
            .await
            .map_err(fail("request failed"))?
            .error_for_status()
            .map_err(fail("unexpected status"))?
            .json()
            .await
            .map_err(fail("unreadable body"))?;

        let typed = serde_json::from_value(raw.clone()).map_err(|err| {
            ErrorKind::InternalIssue
                .hint(format!("{}: unexpected profile shape", self.provider))
                .caused_by(err)
        })?;
        Ok((typed, raw))
    }
}
