//! Session and flow-state cookies, and token extraction from requests.

use axum::http::{
    header::{AUTHORIZATION, COOKIE},
    HeaderMap, HeaderValue,
};
use chrono::Utc;

use crate::auth::{
    config::AuthConfig,
    error::{ErrorKind, Result},
    oauth2::flow::{FLOW_COOKIE_NAME, FLOW_COOKIE_PATH, FLOW_TTL_SECONDS},
    session::Session,
};

fn build(config: &AuthConfig, name: &str, value: &str, path: &str, tail: &str) -> Result<HeaderValue> {
    let mut cookie = format!("{name}={value}; Path={path}; HttpOnly; SameSite=Lax; {tail}");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|err| {
        ErrorKind::InternalIssue
            .hint(format!("invalid {name} cookie"))
            .caused_by(err)
    })
}

/// `HttpOnly` session cookie expiring with the session.
///
/// # Errors
/// Returns `InternalIssue` if the header value cannot be built.
pub fn session_cookie(config: &AuthConfig, session: &Session) -> Result<HeaderValue> {
    let max_age = (session.expires_at - Utc::now()).num_seconds().max(0);
    let expires = session.expires_at.format("%a, %d %b %Y %H:%M:%S GMT");
    build(
        config,
        config.session_cookie(),
        &session.token,
        "/",
        &format!("Max-Age={max_age}; Expires={expires}"),
    )
}

/// # Errors
/// Returns `InternalIssue` if the header value cannot be built.
pub fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue> {
    build(config, config.session_cookie(), "", "/", "Max-Age=0")
}

/// # Errors
/// Returns `InternalIssue` if the header value cannot be built.
pub fn flow_cookie(config: &AuthConfig, sealed_state: &str) -> Result<HeaderValue> {
    build(
        config,
        FLOW_COOKIE_NAME,
        sealed_state,
        FLOW_COOKIE_PATH,
        &format!("Max-Age={FLOW_TTL_SECONDS}"),
    )
}

/// # Errors
/// Returns `InternalIssue` if the header value cannot be built.
pub fn clear_flow_cookie(config: &AuthConfig) -> Result<HeaderValue> {
    build(config, FLOW_COOKIE_NAME, "", FLOW_COOKIE_PATH, "Max-Age=0")
}

/// Value of the first cookie called `name`.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Session cookie first, then `Authorization: Bearer`.
#[must_use]
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    cookie_value(headers, cookie_name).or_else(|| bearer_token(headers))
}
