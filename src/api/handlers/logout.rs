use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

use super::payload::RedirectQuery;
use crate::{
    api::{
        cookies,
        respond::{render, Reply, Strategy},
    },
    auth::AuthState,
};

#[utoipa::path(
    get,
    path= "/logout",
    params(RedirectQuery),
    responses (
        (status = 204, description = "Session cookie cleared"),
        (status = 307, description = "Session cookie cleared, redirect to `redirect_to`"),
    ),
    tag= "auth"
)]
// axum handler for logout
#[instrument(skip(auth))]
pub async fn logout(auth: Extension<Arc<AuthState>>, Query(query): Query<RedirectQuery>) -> Response {
    let strategy = Strategy::from_param(query.redirect_to.as_deref());
    let result = cookies::clear_session_cookie(auth.config())
        .map(|cookie| Reply::empty(StatusCode::NO_CONTENT).with_cookie(cookie));
    render(&strategy, result, &[])
}
