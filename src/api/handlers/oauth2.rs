//! OAuth2 redirect and callback routes.
//!
//! `GET /oauth2` seals the flow into a cookie scoped to `/oauth2` and
//! redirects to the provider. `GET /oauth2/cb` opens it, clears it on every
//! outcome, and finishes login like the password path.

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use utoipa::IntoParams;

use super::{finish_login, LoginResponse};
use crate::{
    api::{
        cookies,
        respond::{render, Reply, Strategy},
    },
    auth::{
        error::Result,
        oauth2::{
            flow::{FlowStage, FlowState},
            CallbackParams, FLOW_COOKIE_NAME,
        },
        AuthState,
    },
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BeginQuery {
    /// User kind for a first login; defaults to the first enabled kind.
    pub kind: Option<String>,
    /// Provider name, e.g. `github`.
    pub p: Option<String>,
    pub redirect_to: Option<String>,
}

#[utoipa::path(
    get,
    path= "/oauth2",
    params(BeginQuery),
    responses (
        (status = 307, description = "Redirect to the provider, or to `redirect_to` with `err_code` on failure"),
        (status = 400, description = "Unknown kind or provider", body = crate::auth::error::ErrorBody),
    ),
    tag= "oauth2"
)]
// axum handler starting an oauth2 login
#[instrument(skip(auth))]
pub async fn begin(auth: Extension<Arc<AuthState>>, Query(query): Query<BeginQuery>) -> Response {
    let strategy = Strategy::from_param(query.redirect_to.as_deref());
    // Only targets usable for a redirect are carried through the flow.
    let redirect_to = match &strategy {
        Strategy::Redirect(target) => Some(target.clone()),
        Strategy::Json => None,
    };

    let started = auth
        .oauth2()
        .begin(
            auth.config(),
            query.kind.as_deref(),
            query.p.as_deref().unwrap_or_default(),
            redirect_to,
        )
        .and_then(|redirect| {
            let cookie = cookies::flow_cookie(auth.config(), &redirect.sealed_state)?;
            Ok((redirect.auth_url, cookie))
        });

    match started {
        Ok((auth_url, cookie)) => render(
            &Strategy::Redirect(auth_url),
            Ok(Reply::empty(StatusCode::TEMPORARY_REDIRECT).with_cookie(cookie)),
            &[],
        ),
        Err(err) => render(&strategy, Err(err), &[]),
    }
}

#[utoipa::path(
    get,
    path= "/oauth2/cb",
    params(CallbackParams),
    responses (
        (status = 200, description = "Logged in; session cookie set", body = LoginResponse),
        (status = 307, description = "Redirect to the flow's `redirect_to`, with `err_code` on failure"),
        (status = 400, description = "Missing, forged or mismatched flow state", body = crate::auth::error::ErrorBody),
        (status = 500, description = "Provider exchange failed", body = crate::auth::error::ErrorBody),
    ),
    tag= "oauth2"
)]
// axum handler for the provider callback
#[instrument(skip(auth, headers, params))]
pub async fn callback(
    auth: Extension<Arc<AuthState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let clear = match cookies::clear_flow_cookie(auth.config()) {
        Ok(cookie) => vec![cookie],
        Err(err) => {
            error!("Failed to build flow cookie: {}", err);
            Vec::new()
        }
    };

    let sealed = cookies::cookie_value(&headers, FLOW_COOKIE_NAME);
    let flow = auth.oauth2().open(sealed.as_deref());

    let target = match &flow {
        Ok(flow) => flow.redirect_to.as_deref().or(params.redirect_to.as_deref()),
        Err(_) => params.redirect_to.as_deref(),
    };
    let strategy = Strategy::from_param(target);

    let result = match flow {
        Ok(flow) => complete(&auth, &flow, &params).await,
        Err(err) => Err(err),
    };
    render(&strategy, result, &clear)
}

async fn complete(auth: &AuthState, flow: &FlowState, params: &CallbackParams) -> Result<Reply> {
    let user = auth.oauth2().complete(auth.store(), flow, params).await?;
    let reply = finish_login(auth, &user)?;
    debug!(stage = %FlowStage::SessionEstablished, provider = %flow.provider, user_id = %user.id);
    info!(user_id = %user.id, provider = %flow.provider, "oauth2 login");
    Ok(reply)
}
