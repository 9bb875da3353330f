use axum::{
    extract::{Extension, Query},
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{
    finish_login,
    payload::{Credentials, RedirectQuery},
    LoginResponse,
};
use crate::{
    api::respond::{render, Reply, Strategy},
    auth::{
        error::{Error, ErrorKind, Result},
        keys::{KeyId, KIND_EMAIL, KIND_USERNAME},
        models::User,
        password::verify_absent,
        utils::{non_blank, normalize_email},
        AuthState,
    },
};

fn rejected(reason: &str) -> Error {
    debug!(reason, "login rejected");
    ErrorKind::MissingAuth.hint("invalid credentials")
}

#[utoipa::path(
    post,
    path= "/login",
    params(RedirectQuery),
    request_body(content = Credentials, content_type = "application/json"),
    responses (
        (status = 200, description = "Logged in; session cookie set", body = LoginResponse),
        (status = 307, description = "Redirect to `redirect_to`, with `err_code` on failure"),
        (status = 400, description = "Invalid input", body = crate::auth::error::ErrorBody),
        (status = 401, description = "Invalid credentials", body = crate::auth::error::ErrorBody),
    ),
    tag= "auth"
)]
// axum handler for login
#[instrument(skip(auth, query, credentials))]
pub async fn login(
    auth: Extension<Arc<AuthState>>,
    Query(query): Query<RedirectQuery>,
    credentials: std::result::Result<Credentials, Error>,
) -> Response {
    match credentials {
        Ok(credentials) => {
            let strategy = Strategy::from_param(query.or(credentials.redirect_to.as_deref()));
            let result = match check_credentials(&auth, &credentials).await {
                Ok(user) => {
                    info!(user_id = %user.id, "password login");
                    finish_login(&auth, &user)
                }
                Err(err) => Err(err),
            };
            render(&strategy, result, &[])
        }
        Err(err) => render(&Strategy::from_param(query.or(None)), Err::<Reply, _>(err), &[]),
    }
}

/// Every failing check collapses into the same `MissingAuth`.
async fn check_credentials(auth: &AuthState, credentials: &Credentials) -> Result<User> {
    let password = non_blank(credentials.password.as_deref())
        .ok_or_else(|| ErrorKind::InvalidInput.coded("password_required").hint("password is required"))?;

    let email = non_blank(credentials.email.as_deref()).map(normalize_email);
    let key = match (&email, non_blank(credentials.username.as_deref())) {
        (Some(email), _) => KeyId::build(KIND_EMAIL, email),
        (None, Some(username)) => KeyId::build(KIND_USERNAME, username),
        (None, None) => return Err(ErrorKind::InvalidInput.hint("username or email is required")),
    }
    .map_err(|_| rejected("malformed key"))?;

    let user = auth.store().get(&key).await.map_err(|err| {
        if err.is(ErrorKind::NotFound) {
            let _ = verify_absent(password);
            rejected("unknown key")
        } else {
            err
        }
    })?;

    if !user.check_password(password) {
        return Err(rejected("password mismatch"));
    }

    if let Some(email) = email {
        if user.email.as_deref() != Some(email.as_str()) {
            return Err(rejected("email mismatch"));
        }
    }

    let requested_kind = non_blank(credentials.kind.as_deref()).unwrap_or_else(|| auth.config().default_kind());
    if user.kind != requested_kind || !auth.config().is_enabled_kind(&user.kind) {
        return Err(rejected("kind mismatch"));
    }

    Ok(user)
}
