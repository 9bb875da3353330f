use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::config::{DEFAULT_SESSION_COOKIE, DEFAULT_SESSION_TTL_SECONDS};

pub const ARG_BASE_URL: &str = "base-url";
pub const ARG_SIGNING_SECRET: &str = "signing-secret";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_SESSION_COOKIE: &str = "session-cookie";
pub const ARG_ENABLED_KINDS: &str = "enabled-kinds";

#[derive(Debug, Clone)]
pub struct Options {
    pub base_url: String,
    pub signing_secret: SecretString,
    pub session_ttl_seconds: i64,
    pub session_cookie: String,
    pub enabled_kinds: Vec<String>,
}

impl Options {
    /// Parse session and login arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let signing_secret = match matches.get_one::<String>(ARG_SIGNING_SECRET) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => anyhow::bail!("missing required argument: --{ARG_SIGNING_SECRET}"),
        };

        let enabled_kinds = matches
            .get_many::<String>(ARG_ENABLED_KINDS)
            .map(|kinds| {
                kinds
                    .map(|kind| kind.trim().to_string())
                    .filter(|kind| !kind.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            base_url: matches
                .get_one::<String>(ARG_BASE_URL)
                .cloned()
                .unwrap_or_default(),
            signing_secret,
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_SESSION_TTL_SECONDS),
            session_cookie: matches
                .get_one::<String>(ARG_SESSION_COOKIE)
                .cloned()
                .unwrap_or_default(),
            enabled_kinds,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BASE_URL)
                .long(ARG_BASE_URL)
                .help("Public base URL, used for the OAuth2 callback and verification links")
                .env("IDGATE_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_SIGNING_SECRET)
                .long(ARG_SIGNING_SECRET)
                .help("Secret used to sign session tokens and OAuth2 flow cookies")
                .env("IDGATE_SIGNING_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds")
                .env("IDGATE_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE)
                .long(ARG_SESSION_COOKIE)
                .help("Session cookie name")
                .env("IDGATE_SESSION_COOKIE")
                .default_value(DEFAULT_SESSION_COOKIE),
        )
        .arg(
            Arg::new(ARG_ENABLED_KINDS)
                .long(ARG_ENABLED_KINDS)
                .help("Comma separated user kinds allowed to register and log in")
                .env("IDGATE_ENABLED_KINDS")
                .value_delimiter(',')
                .default_value("standard"),
        )
}
