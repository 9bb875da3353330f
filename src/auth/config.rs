use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use super::{
    error::{ErrorKind, Result},
    models::DEFAULT_USER_KIND,
};

pub const DEFAULT_SESSION_COOKIE: &str = "_idgate_auth";
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
pub const MAX_SESSION_TTL_SECONDS: i64 = 366 * 24 * 60 * 60;
pub const DEFAULT_OAUTH2_TIMEOUT_SECONDS: u64 = 10;

/// Credentials for one OAuth2 application.
#[derive(Clone, Debug)]
pub struct OAuth2AppConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub scopes: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    session_ttl_seconds: i64,
    session_cookie: String,
    signing_secret: SecretString,
    enabled_kinds: Vec<String>,
    oauth2_timeout_seconds: u64,
    github: Option<OAuth2AppConfig>,
    google: Option<OAuth2AppConfig>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(base_url: String, signing_secret: SecretString) -> Self {
        Self {
            base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            signing_secret,
            enabled_kinds: vec![DEFAULT_USER_KIND.to_string()],
            oauth2_timeout_seconds: DEFAULT_OAUTH2_TIMEOUT_SECONDS,
            github: None,
            google: None,
        }
    }

    #[must_use]
    pub const fn with_session_ttl_seconds(mut self, ttl_seconds: i64) -> Self {
        self.session_ttl_seconds = ttl_seconds;
        self
    }

    #[must_use]
    pub fn with_session_cookie(mut self, name: String) -> Self {
        self.session_cookie = name;
        self
    }

    #[must_use]
    pub fn with_enabled_kinds(mut self, kinds: Vec<String>) -> Self {
        self.enabled_kinds = kinds;
        self
    }

    #[must_use]
    pub const fn with_oauth2_timeout_seconds(mut self, seconds: u64) -> Self {
        self.oauth2_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_github(mut self, app: Option<OAuth2AppConfig>) -> Self {
        self.github = app;
        self
    }

    #[must_use]
    pub fn with_google(mut self, app: Option<OAuth2AppConfig>) -> Self {
        self.google = app;
        self
    }

    /// Fill defaults and reject unusable settings.
    ///
    /// # Errors
    /// Returns `InvalidInput` for a missing signing secret, an unusable base URL
    /// or a session TTL above [`MAX_SESSION_TTL_SECONDS`].
    pub fn sanitise(mut self) -> Result<Self> {
        if self.signing_secret.expose_secret().trim().is_empty() {
            return Err(ErrorKind::InvalidInput.hint("signing_secret is required"));
        }

        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&self.base_url).map_err(|err| {
            ErrorKind::InvalidInput
                .hint(format!("base_url is not a valid URL: {}", self.base_url))
                .caused_by(err)
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ErrorKind::InvalidInput.hint("base_url must be http or https"));
        }

        if self.session_ttl_seconds <= 0 {
            self.session_ttl_seconds = DEFAULT_SESSION_TTL_SECONDS;
        }
        if self.session_ttl_seconds > MAX_SESSION_TTL_SECONDS {
            return Err(ErrorKind::InvalidInput.hint(format!(
                "session_ttl_seconds must be at most {MAX_SESSION_TTL_SECONDS}"
            )));
        }
        if self.session_cookie.trim().is_empty() {
            self.session_cookie = DEFAULT_SESSION_COOKIE.to_string();
        }
        if self.oauth2_timeout_seconds == 0 {
            self.oauth2_timeout_seconds = DEFAULT_OAUTH2_TIMEOUT_SECONDS;
        }

        let mut kinds: Vec<String> = Vec::new();
        for kind in &self.enabled_kinds {
            let kind = kind.trim();
            if !kind.is_empty() && !kinds.iter().any(|k| k == kind) {
                kinds.push(kind.to_string());
            }
        }
        if kinds.is_empty() {
            kinds.push(DEFAULT_USER_KIND.to_string());
        }
        self.enabled_kinds = kinds;

        Ok(self)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Redirect URI registered with every provider.
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!("{}/oauth2/cb", self.base_url)
    }

    #[must_use]
    pub const fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn session_cookie(&self) -> &str {
        &self.session_cookie
    }

    /// Cookies get `Secure` only when served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    #[must_use]
    pub const fn signing_secret(&self) -> &SecretString {
        &self.signing_secret
    }

    #[must_use]
    pub fn enabled_kinds(&self) -> &[String] {
        &self.enabled_kinds
    }

    #[must_use]
    pub fn is_enabled_kind(&self, kind: &str) -> bool {
        self.enabled_kinds.iter().any(|k| k == kind)
    }

    #[must_use]
    pub fn default_kind(&self) -> &str {
        self.enabled_kinds
            .first()
            .map_or(DEFAULT_USER_KIND, String::as_str)
    }

    /// Pick the requested kind, or the default when none was given.
    ///
    /// # Errors
    /// Returns `InvalidInput` coded `invalid_kind` for a kind that is not enabled.
    pub fn resolve_kind(&self, requested: Option<&str>) -> Result<String> {
        match requested.map(str::trim).filter(|k| !k.is_empty()) {
            None => Ok(self.default_kind().to_string()),
            Some(kind) if self.is_enabled_kind(kind) => Ok(kind.to_string()),
            Some(kind) => Err(ErrorKind::InvalidInput
                .coded("invalid_kind")
                .hint(format!("user kind '{kind}' is not enabled"))),
        }
    }

    #[must_use]
    pub const fn oauth2_timeout(&self) -> Duration {
        Duration::from_secs(self.oauth2_timeout_seconds)
    }

    #[must_use]
    pub const fn github(&self) -> Option<&OAuth2AppConfig> {
        self.github.as_ref()
    }

    #[must_use]
    pub const fn google(&self) -> Option<&OAuth2AppConfig> {
        self.google.as_ref()
    }
}
