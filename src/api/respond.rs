//! One renderer for both response modes.
//!
//! A request that names a `redirect_to` target gets every outcome as a 307
//! to that target, with failures reported as an `err_code` query pair. All
//! other requests get JSON bodies.

use axum::{
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;
use tracing::error;
use url::{Position, Url};

use crate::auth::{
    error::{ErrorKind, Result},
    utils::non_blank,
};

const ERR_CODE_PARAM: &str = "err_code";
const ROOTED_BASE: &str = "http://redirect.invalid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Json,
    Redirect(String),
}

impl Strategy {
    /// Absolute http(s) URLs and rooted paths redirect; anything else,
    /// including protocol-relative `//host` targets, falls back to JSON.
    #[must_use]
    pub fn from_param(redirect_to: Option<&str>) -> Self {
        let Some(target) = non_blank(redirect_to) else {
            return Self::Json;
        };

        if target.starts_with('/') {
            if target.starts_with("//") || target.starts_with("/\\") {
                return Self::Json;
            }
            return Self::Redirect(target.to_string());
        }

        match Url::parse(target) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
                Self::Redirect(target.to_string())
            }
            _ => Self::Json,
        }
    }
}

/// Successful outcome before it is rendered.
#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    body: Option<Value>,
    cookies: Vec<HeaderValue>,
}

impl Reply {
    /// # Errors
    /// Returns `InternalIssue` if the body cannot be serialised.
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Self> {
        let body = serde_json::to_value(body).map_err(|err| {
            ErrorKind::InternalIssue
                .hint("failed to serialise response")
                .caused_by(err)
        })?;
        Ok(Self {
            status,
            body: Some(body),
            cookies: Vec::new(),
        })
    }

    #[must_use]
    pub const fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: None,
            cookies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cookie(mut self, cookie: HeaderValue) -> Self {
        self.cookies.push(cookie);
        self
    }
}

/// Render `result` according to `strategy`. `extra_cookies` are set on
/// every outcome, success or failure.
pub fn render(strategy: &Strategy, result: Result<Reply>, extra_cookies: &[HeaderValue]) -> Response {
    let mut headers = HeaderMap::new();
    for cookie in extra_cookies {
        headers.append(SET_COOKIE, cookie.clone());
    }

    match result {
        Ok(reply) => {
            for cookie in reply.cookies {
                headers.append(SET_COOKIE, cookie);
            }
            match strategy {
                Strategy::Redirect(target) => redirect(target, headers),
                Strategy::Json => match reply.body {
                    Some(body) => (reply.status, headers, Json(body)).into_response(),
                    None => (reply.status, headers).into_response(),
                },
            }
        }
        Err(err) => {
            err.log();
            let body = err.body();
            match strategy {
                Strategy::Redirect(target) => redirect(&with_error_code(target, &body.code), headers),
                Strategy::Json => (err.status(), headers, Json(body)).into_response(),
            }
        }
    }
}

fn redirect(target: &str, mut headers: HeaderMap) -> Response {
    match HeaderValue::from_str(target) {
        Ok(location) => {
            headers.insert(LOCATION, location);
            (StatusCode::TEMPORARY_REDIRECT, headers).into_response()
        }
        Err(err) => {
            error!("Invalid redirect target: {}", err);
            let err = ErrorKind::InternalIssue.caused_by(err);
            (err.status(), headers, Json(err.body())).into_response()
        }
    }
}

/// Replace or append `err_code`, keeping every other query pair.
fn with_error_code(target: &str, code: &str) -> String {
    let rooted = target.starts_with('/');
    let parsed = if rooted {
        Url::parse(ROOTED_BASE).and_then(|base| base.join(target))
    } else {
        Url::parse(target)
    };
    let Ok(mut url) = parsed else {
        return target.to_string();
    };

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != ERR_CODE_PARAM)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair(ERR_CODE_PARAM, code);

    if rooted {
        url[Position::BeforePath..].to_string()
    } else {
        url.into()
    }
}
