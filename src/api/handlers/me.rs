use axum::{extract::Extension, http::StatusCode, response::Response};
use std::sync::Arc;
use tracing::instrument;

use super::json;
use crate::{
    api::respond::Reply,
    auth::{
        error::{ErrorKind, Result},
        models::PublicUser,
        session::CurrentSession,
        AuthState,
    },
};

#[utoipa::path(
    get,
    path= "/me",
    responses (
        (status = 200, description = "The authenticated user", body = PublicUser),
        (status = 401, description = "No valid session", body = crate::auth::error::ErrorBody),
    ),
    tag= "auth"
)]
// axum handler for whoami
#[instrument(skip(auth, session))]
pub async fn me(
    auth: Extension<Arc<AuthState>>,
    session: Option<Extension<CurrentSession>>,
) -> Response {
    json(whoami(&auth, session.map(|Extension(session)| session)).await)
}

async fn whoami(auth: &AuthState, session: Option<CurrentSession>) -> Result<Reply> {
    let session = session.ok_or_else(|| ErrorKind::MissingAuth.hint("no session"))?;
    let user = auth
        .store()
        .get_by_id(session.user_id)
        .await
        .map_err(|err| err.remap(ErrorKind::NotFound, ErrorKind::MissingAuth))?;
    Reply::json(StatusCode::OK, &user.to_public(true))
}
