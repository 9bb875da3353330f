use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::Response,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::payload::{Credentials, RedirectQuery};
use crate::{
    api::respond::{render, Reply, Strategy},
    auth::{
        error::{Error, ErrorKind, Result},
        mailer::verification_link,
        models::{PublicUser, User},
        password,
        utils::{non_blank, normalize_email, valid_email},
        AuthState,
    },
};

#[utoipa::path(
    post,
    path= "/register",
    params(RedirectQuery),
    request_body(content = Credentials, content_type = "application/json"),
    responses (
        (status = 201, description = "User registered", body = PublicUser),
        (status = 307, description = "Redirect to `redirect_to`, with `err_code` on failure"),
        (status = 400, description = "Invalid input", body = crate::auth::error::ErrorBody),
        (status = 409, description = "Username or email already registered", body = crate::auth::error::ErrorBody),
    ),
    tag= "auth"
)]
// axum handler for register
#[instrument(skip(auth, query, credentials))]
pub async fn register(
    auth: Extension<Arc<AuthState>>,
    Query(query): Query<RedirectQuery>,
    credentials: std::result::Result<Credentials, Error>,
) -> Response {
    match credentials {
        Ok(credentials) => {
            let strategy = Strategy::from_param(query.or(credentials.redirect_to.as_deref()));
            render(&strategy, register_user(&auth, credentials).await, &[])
        }
        Err(err) => render(&Strategy::from_param(query.or(None)), Err(err), &[]),
    }
}

async fn register_user(auth: &AuthState, credentials: Credentials) -> Result<Reply> {
    let password = non_blank(credentials.password.as_deref())
        .ok_or_else(|| ErrorKind::InvalidInput.coded("password_required").hint("password is required"))?;
    let kind = auth.config().resolve_kind(credentials.kind.as_deref())?;

    let username = non_blank(credentials.username.as_deref()).map(str::to_string);
    let email = match non_blank(credentials.email.as_deref()).map(normalize_email) {
        Some(email) if !valid_email(&email) => {
            return Err(ErrorKind::InvalidInput
                .coded("invalid_email")
                .hint("email is not valid"));
        }
        email => email,
    };
    if username.is_none() && email.is_none() {
        return Err(ErrorKind::InvalidInput.hint("username or email is required"));
    }

    let mut user = User::new(&kind, username, email);
    user.password_hash = Some(password::hash(password)?);

    let user = auth.store().register(user, Vec::new()).await?;
    info!(user_id = %user.id, kind = %user.kind, "registered user");

    if let Some(email) = user.email.as_deref() {
        send_verification(auth, &user, email).await;
    }

    Reply::json(StatusCode::CREATED, &user.to_public(true))
}

/// Failures are logged; the registration itself already succeeded.
async fn send_verification(auth: &AuthState, user: &User, email: &str) {
    let token = match auth.store().issue_verification(user.id).await {
        Ok(token) => token,
        Err(err) => {
            warn!(user_id = %user.id, "Failed to issue verification token: {}", err);
            return;
        }
    };

    let link = match verification_link(auth.config().base_url(), user.id, &token) {
        Ok(link) => link,
        Err(err) => {
            warn!(user_id = %user.id, "Failed to build verification link: {}", err);
            return;
        }
    };

    if let Err(err) = auth.mailer().send_verification(email, &link).await {
        warn!(user_id = %user.id, "Failed to send verification email: {}", err);
    }
}
