//! Tagged error type shared by the store, session and OAuth2 layers.
//!
//! Every failure carries an [`ErrorKind`] which decides the HTTP status, a
//! machine readable `code` and a client facing message. Internal causes are
//! kept for logging and never rendered.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::{collections::BTreeMap, fmt};
use thiserror::Error;
use tracing::{debug, error};
use utoipa::ToSchema;

pub type Result<T, E = Error> = std::result::Result<T, E>;

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    Conflict,
    NotFound,
    MissingAuth,
    InternalIssue,
}

impl ErrorKind {
    /// Default machine readable code for this kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::MissingAuth => "missing_auth",
            Self::InternalIssue => "internal_issue",
        }
    }

    const fn message(self) -> &'static str {
        match self {
            Self::InvalidInput => "Request is not valid",
            Self::Conflict => "Resource already exists",
            Self::NotFound => "Resource not found",
            Self::MissingAuth => "Authentication required",
            Self::InternalIssue => "Internal error",
        }
    }

    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::Conflict => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MissingAuth => StatusCode::UNAUTHORIZED,
            Self::InternalIssue => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn coded(self, code: impl Into<String>) -> Error {
        Error::from(self).coded(code)
    }

    #[must_use]
    pub fn hint(self, hint: impl Into<String>) -> Error {
        Error::from(self).hint(hint)
    }

    #[must_use]
    pub fn caused_by(self, cause: impl Into<Cause>) -> Error {
        Error::from(self).caused_by(cause)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    code: String,
    message: String,
    attribs: BTreeMap<String, String>,
    #[source]
    cause: Option<Cause>,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            code: kind.code().to_string(),
            message: kind.message().to_string(),
            attribs: BTreeMap::new(),
            cause: None,
        }
    }
}

impl Error {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn attrib(&self, name: &str) -> Option<&str> {
        self.attribs.get(name).map(String::as_str)
    }

    /// Replace the machine readable code, e.g. `invalid_email`.
    #[must_use]
    pub fn coded(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    /// Replace the human readable message.
    #[must_use]
    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.message = hint.into();
        self
    }

    #[must_use]
    pub fn with_attrib(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attribs.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn caused_by(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Remap the kind while keeping the cause, used to collapse lookup
    /// failures into an authentication failure.
    #[must_use]
    pub fn remap(self, from: ErrorKind, to: ErrorKind) -> Self {
        if self.kind == from {
            Self::from(to).caused_by(self)
        } else {
            self
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// Body rendered to clients; internal issues never expose their hint.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        if self.kind == ErrorKind::InternalIssue {
            return ErrorBody {
                code: self.kind.code().to_string(),
                message: self.kind.message().to_string(),
                attribs: None,
            };
        }

        ErrorBody {
            code: self.code.clone(),
            message: self.message.clone(),
            attribs: (!self.attribs.is_empty()).then(|| self.attribs.clone()),
        }
    }

    /// Log once at the response boundary.
    pub fn log(&self) {
        match self.kind {
            ErrorKind::InternalIssue => match &self.cause {
                Some(cause) => error!(code = %self.code, "{}: {cause}", self.message),
                None => error!(code = %self.code, "{}", self.message),
            },
            _ => debug!(code = %self.code, kind = %self.kind, "{}", self.message),
        }
    }
}

#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribs: Option<BTreeMap<String, String>>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        self.log();
        (self.status(), Json(self.body())).into_response()
    }
}
