//! Request payloads shared by the password handlers.

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
    Form, Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::auth::error::{Error, ErrorKind};

/// Register/login body, accepted as JSON or as an urlencoded form.
#[derive(Deserialize, ToSchema, Default)]
pub struct Credentials {
    pub kind: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub redirect_to: Option<String>,
}

/// `redirect_to` given on the query string takes precedence over the body.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RedirectQuery {
    pub redirect_to: Option<String>,
}

impl RedirectQuery {
    #[must_use]
    pub fn or<'a>(&'a self, fallback: Option<&'a str>) -> Option<&'a str> {
        self.redirect_to.as_deref().or(fallback)
    }
}

fn is_form(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

#[async_trait]
impl<S> FromRequest<S> for Credentials
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_form(&req) {
            let Form(credentials) = Form::<Self>::from_request(req, state).await.map_err(|rejection| {
                ErrorKind::InvalidInput
                    .coded("invalid_body")
                    .hint(rejection.body_text())
            })?;
            return Ok(credentials);
        }

        let Json(credentials) = Json::<Self>::from_request(req, state).await.map_err(|rejection| {
            ErrorKind::InvalidInput
                .coded("invalid_body")
                .hint(rejection.body_text())
        })?;
        Ok(credentials)
    }
}
