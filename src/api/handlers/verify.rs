use axum::{
    extract::{Extension, Query},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::IntoParams;
use uuid::Uuid;

use super::{finish_login, LoginResponse};
use crate::{
    api::respond::{render, Reply, Strategy},
    auth::{
        error::{ErrorKind, Result},
        utils::non_blank,
        AuthState,
    },
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyQuery {
    pub id: Option<String>,
    pub token: Option<String>,
    pub redirect_to: Option<String>,
}

#[utoipa::path(
    get,
    path= "/verify",
    params(VerifyQuery),
    responses (
        (status = 200, description = "Email verified; session cookie set", body = LoginResponse),
        (status = 307, description = "Redirect to `redirect_to`, with `err_code` on failure"),
        (status = 401, description = "Unknown user or token", body = crate::auth::error::ErrorBody),
    ),
    tag= "auth"
)]
// axum handler for email verification links
#[instrument(skip(auth, query))]
pub async fn verify(auth: Extension<Arc<AuthState>>, Query(query): Query<VerifyQuery>) -> Response {
    let strategy = Strategy::from_param(query.redirect_to.as_deref());
    render(&strategy, verify_email(&auth, &query).await, &[])
}

async fn verify_email(auth: &AuthState, query: &VerifyQuery) -> Result<Reply> {
    let id = non_blank(query.id.as_deref())
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or_else(|| ErrorKind::MissingAuth.hint("invalid verification link"))?;
    let token = non_blank(query.token.as_deref())
        .ok_or_else(|| ErrorKind::MissingAuth.hint("invalid verification link"))?;

    let user = auth
        .store()
        .verify(id, token)
        .await
        .map_err(|err| err.remap(ErrorKind::NotFound, ErrorKind::MissingAuth))?;
    info!(user_id = %user.id, "email verified");

    finish_login(auth, &user)
}
