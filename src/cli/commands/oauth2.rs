use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::config::{OAuth2AppConfig, DEFAULT_OAUTH2_TIMEOUT_SECONDS};

pub const ARG_OAUTH2_TIMEOUT_SECONDS: &str = "oauth2-timeout-seconds";

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub timeout_seconds: u64,
    pub github: Option<OAuth2AppConfig>,
    pub google: Option<OAuth2AppConfig>,
}

impl Options {
    /// A provider is configured only when both its client id and secret are set.
    ///
    /// # Errors
    /// Returns an error if only one half of a provider's credentials is set.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        Ok(Self {
            timeout_seconds: matches
                .get_one::<u64>(ARG_OAUTH2_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_OAUTH2_TIMEOUT_SECONDS),
            github: app(matches, "github")?,
            google: app(matches, "google")?,
        })
    }
}

fn app(matches: &ArgMatches, provider: &str) -> anyhow::Result<Option<OAuth2AppConfig>> {
    let get_non_empty = |suffix: &str| {
        matches
            .get_one::<String>(&format!("{provider}-{suffix}"))
            .cloned()
            .filter(|v| !v.trim().is_empty())
    };

    match (get_non_empty("client-id"), get_non_empty("client-secret")) {
        (Some(client_id), Some(client_secret)) => Ok(Some(OAuth2AppConfig {
            client_id,
            client_secret: SecretString::from(client_secret),
            scopes: matches
                .get_many::<String>(&format!("{provider}-scopes"))
                .map(|scopes| scopes.filter(|s| !s.trim().is_empty()).cloned().collect())
                .unwrap_or_default(),
        })),
        (None, None) => Ok(None),
        _ => anyhow::bail!(
            "--{provider}-client-id and --{provider}-client-secret must be set together"
        ),
    }
}

fn provider_args(
    command: Command,
    (id, secret, scopes): (&'static str, &'static str, &'static str),
    (id_env, secret_env, scopes_env): (&'static str, &'static str, &'static str),
) -> Command {
    command
        .arg(
            Arg::new(id)
                .long(id)
                .help("OAuth2 client id")
                .env(id_env),
        )
        .arg(
            Arg::new(secret)
                .long(secret)
                .help("OAuth2 client secret")
                .env(secret_env)
                .hide_env_values(true),
        )
        .arg(
            Arg::new(scopes)
                .long(scopes)
                .help("Comma separated scopes, provider defaults when unset")
                .env(scopes_env)
                .value_delimiter(','),
        )
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = command.arg(
        Arg::new(ARG_OAUTH2_TIMEOUT_SECONDS)
            .long(ARG_OAUTH2_TIMEOUT_SECONDS)
            .help("Timeout for calls to OAuth2 providers")
            .env("IDGATE_OAUTH2_TIMEOUT_SECONDS")
            .default_value("10")
            .value_parser(clap::value_parser!(u64)),
    );
    let command = provider_args(
        command,
        ("github-client-id", "github-client-secret", "github-scopes"),
        (
            "IDGATE_GITHUB_CLIENT_ID",
            "IDGATE_GITHUB_CLIENT_SECRET",
            "IDGATE_GITHUB_SCOPES",
        ),
    );
    provider_args(
        command,
        ("google-client-id", "google-client-secret", "google-scopes"),
        (
            "IDGATE_GOOGLE_CLIENT_ID",
            "IDGATE_GOOGLE_CLIENT_SECRET",
            "IDGATE_GOOGLE_SCOPES",
        ),
    )
}
