use crate::auth::{
    mailer::LogMailer, oauth2::registry_from_config, store::PgStore, AuthConfig, AuthState,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware, Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod cookies;
pub(crate) mod handlers;
mod openapi;
pub mod respond;

pub use openapi::openapi;

/// Documented routes plus `/openapi.json`, `/swagger-ui` and the session
/// middleware, without the transport layers added by [`new`].
#[must_use]
pub fn router(auth: Arc<AuthState>) -> Router {
    let (router, openapi) = openapi::api_router().split_for_parts();
    router
        .merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", openapi))
        .layer(middleware::from_fn_with_state(
            auth.clone(),
            handlers::authenticate,
        ))
        .layer(Extension(auth))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, auth_config: AuthConfig) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let store = PgStore::new(pool);
    store.migrate().await.context("Failed to apply schema")?;

    let providers = registry_from_config(&auth_config).context("Failed to build OAuth2 providers")?;
    let auth_state = Arc::new(AuthState::new(
        auth_config,
        Arc::new(store),
        providers,
        Arc::new(LogMailer),
    ));

    let app = router(auth_state).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", err);
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
