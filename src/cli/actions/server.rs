use crate::{
    api,
    auth::AuthConfig,
    cli::commands::{auth, oauth2},
};
use anyhow::{Context, Result};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub auth: auth::Options,
    pub oauth2: oauth2::Options,
}

/// Build and validate the auth configuration from parsed arguments.
///
/// # Errors
/// Returns an error if the configuration is invalid (e.g. empty signing secret).
pub fn auth_config(args: &Args) -> Result<AuthConfig> {
    AuthConfig::new(args.auth.base_url.clone(), args.auth.signing_secret.clone())
        .with_session_ttl_seconds(args.auth.session_ttl_seconds)
        .with_session_cookie(args.auth.session_cookie.clone())
        .with_enabled_kinds(args.auth.enabled_kinds.clone())
        .with_oauth2_timeout_seconds(args.oauth2.timeout_seconds)
        .with_github(args.oauth2.github.clone())
        .with_google(args.oauth2.google.clone())
        .sanitise()
        .context("Invalid auth configuration")
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = auth_config(&args)?;
    debug!("Auth config: {:?}", config);

    api::new(args.port, args.dsn, config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn args(secret: &str, base_url: &str) -> Args {
        Args {
            port: 8080,
            dsn: "postgres://localhost/idgate".to_string(),
            auth: auth::Options {
                base_url: base_url.to_string(),
                signing_secret: SecretString::from(secret.to_string()),
                session_ttl_seconds: 0,
                session_cookie: String::new(),
                enabled_kinds: Vec::new(),
            },
            oauth2: oauth2::Options::default(),
        }
    }

    #[test]
    fn config_defaults_are_filled() -> Result<()> {
        let config = auth_config(&args("secret", "https://id.example.com/"))?;
        assert_eq!(config.base_url(), "https://id.example.com");
        assert_eq!(config.callback_url(), "https://id.example.com/oauth2/cb");
        assert_eq!(config.session_ttl_seconds(), 43200);
        assert_eq!(config.session_cookie(), "_idgate_auth");
        assert_eq!(config.enabled_kinds(), ["standard".to_string()]);
        assert!(config.session_cookie_secure());
        Ok(())
    }

    #[test]
    fn empty_secret_is_fatal() {
        let result = auth_config(&args("", "http://localhost:8080"));
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(format!("{err:#}").contains("signing_secret is required"));
        }
    }
}
