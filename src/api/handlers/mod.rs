//! Route handlers and the session middleware.
//!
//! Handlers that can be driven by page navigation pick a [`Strategy`] once
//! from `redirect_to` and hand their outcome to [`respond::render`].

pub mod health;
pub mod login;
pub mod logout;
pub mod me;
pub mod oauth2;
pub mod payload;
pub mod register;
pub mod verify;

#[cfg(test)]
mod tests;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

use super::{
    cookies,
    respond::{self, Reply, Strategy},
};
use crate::auth::{error::Result, models::PublicUser, models::User, AuthState};

/// Body returned by every successful login path.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub user: PublicUser,
    pub token: String,
    pub expiry: DateTime<Utc>,
}

/// Issue a session for `user`: cookie plus `{user, token, expiry}`.
pub(crate) fn finish_login(auth: &AuthState, user: &User) -> Result<Reply> {
    let session = auth.sessions().create(user)?;
    let cookie = cookies::session_cookie(auth.config(), &session)?;
    let body = LoginResponse {
        user: user.to_public(true),
        token: session.token,
        expiry: session.expires_at,
    };
    Ok(Reply::json(StatusCode::OK, &body)?.with_cookie(cookie))
}

/// Verify the session cookie (or bearer token) and expose it as a
/// [`crate::auth::session::CurrentSession`] extension. Never rejects.
pub async fn authenticate(
    State(auth): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = cookies::session_token(request.headers(), auth.config().session_cookie()) {
        match auth.sessions().verify(&token) {
            Some(session) => {
                request.extensions_mut().insert(session);
            }
            None => debug!("ignoring invalid or expired session token"),
        }
    }
    next.run(request).await
}

pub(crate) fn json(result: Result<Reply>) -> Response {
    respond::render(&Strategy::Json, result, &[])
}
