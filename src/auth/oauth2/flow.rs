//! Redirect → callback → resolve state machine.
//!
//! No server-side storage: the provider session and the caller's intent are
//! sealed into a short-lived cookie at redirect time and opened once at
//! callback. The callback `state` must equal the one inside that cookie
//! before any provider call is made.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};
use utoipa::IntoParams;

use super::provider::{ExternalUser, ProviderRegistry};
use crate::auth::{
    config::AuthConfig,
    error::{Error, ErrorKind, Result},
    models::User,
    seal::{SealError, Sealer, PURPOSE_OAUTH2_FLOW},
    store::UserStore,
    utils::{non_blank, random_token},
};

pub const FLOW_COOKIE_NAME: &str = "_idgate_oauth2";
pub const FLOW_COOKIE_PATH: &str = "/oauth2";
pub const FLOW_TTL_SECONDS: i64 = 600;

const STATE_BYTES: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    RedirectIssued,
    CallbackReceived,
    ProfileFetched,
    UserResolved,
    SessionEstablished,
    Aborted,
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RedirectIssued => "redirect_issued",
            Self::CallbackReceived => "callback_received",
            Self::ProfileFetched => "profile_fetched",
            Self::UserResolved => "user_resolved",
            Self::SessionEstablished => "session_established",
            Self::Aborted => "aborted",
        })
    }
}

/// What travels inside the flow cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    pub user_kind: String,
    pub provider: String,
    /// Marshalled [`super::provider::ProviderSession`].
    pub session: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

/// Query string the provider sends back to the callback.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub redirect_to: Option<String>,
}

/// Outcome of starting a flow.
#[derive(Debug, Clone)]
pub struct Redirect {
    pub auth_url: String,
    pub sealed_state: String,
}

pub(crate) fn invalid_callback(hint: impl Into<String>) -> Error {
    ErrorKind::InvalidInput.coded("invalid_callback").hint(hint)
}

fn invalid_provider(name: &str) -> Error {
    ErrorKind::InvalidInput
        .coded("invalid_provider")
        .hint(format!("unknown provider '{name}'"))
}

#[derive(Clone, Debug)]
pub struct Orchestrator {
    providers: ProviderRegistry,
    sealer: Sealer,
}

impl Orchestrator {
    #[must_use]
    pub const fn new(providers: ProviderRegistry, sealer: Sealer) -> Self {
        Self { providers, sealer }
    }

    #[must_use]
    pub const fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Validate the request, start a provider attempt and seal the flow.
    ///
    /// # Errors
    /// `invalid_kind` or `invalid_provider` for bad input; `InternalIssue`
    /// when the provider or the sealer fails.
    pub fn begin(
        &self,
        config: &AuthConfig,
        kind: Option<&str>,
        provider_name: &str,
        redirect_to: Option<String>,
    ) -> Result<Redirect> {
        let user_kind = config.resolve_kind(kind)?;
        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| invalid_provider(provider_name))?;

        let state = random_token(STATE_BYTES)?;
        let session = provider.begin_auth(&state)?;
        let flow = FlowState {
            user_kind,
            provider: provider_name.to_string(),
            session: session.marshal()?,
            redirect_to,
        };

        let expires_at = Utc::now() + Duration::seconds(FLOW_TTL_SECONDS);
        let sealed_state = self
            .sealer
            .seal(PURPOSE_OAUTH2_FLOW, &flow, expires_at)
            .map_err(|err| ErrorKind::InternalIssue.caused_by(err))?;

        debug!(stage = %FlowStage::RedirectIssued, provider = provider_name, "oauth2 flow started");
        Ok(Redirect {
            auth_url: session.auth_url,
            sealed_state,
        })
    }

    /// Open the flow cookie; a missing, forged or stale cookie is `invalid_callback`.
    ///
    /// # Errors
    /// See above.
    pub fn open(&self, sealed: Option<&str>) -> Result<FlowState> {
        let sealed = non_blank(sealed).ok_or_else(|| invalid_callback("no oauth2 flow in progress"))?;
        self.sealer
            .open::<FlowState>(PURPOSE_OAUTH2_FLOW, sealed, Utc::now())
            .map(|opened| opened.body)
            .map_err(|err| {
                let hint = match err {
                    SealError::Expired => "oauth2 flow expired",
                    _ => "oauth2 flow state is invalid",
                };
                invalid_callback(hint).caused_by(err)
            })
    }

    /// Check the callback against the sealed flow, then exchange the code
    /// and resolve the local user.
    ///
    /// # Errors
    /// `invalid_callback` for an unknown provider, a state mismatch or a
    /// missing code (all checked before any network call); `InternalIssue` for provider failures; `Conflict`
    /// if a concurrent first login won the key.
    pub async fn complete(
        &self,
        store: &dyn UserStore,
        flow: &FlowState,
        params: &CallbackParams,
    ) -> Result<User> {
        let provider = self.providers.get(&flow.provider).ok_or_else(|| {
            invalid_callback(format!("provider '{}' is no longer available", flow.provider))
        })?;
        let session = provider.unmarshal_session(&flow.session)?;
        debug!(stage = %FlowStage::CallbackReceived, provider = %flow.provider);

        if params.state.as_deref() != Some(session.state.as_str()) {
            debug!(stage = %FlowStage::Aborted, provider = %flow.provider, "state mismatch");
            return Err(invalid_callback("state does not match"));
        }

        let Some(code) = non_blank(params.code.as_deref()) else {
            let hint = match non_blank(params.error.as_deref()) {
                Some(error) => format!("provider returned an error: {error}"),
                None => "authorization code is missing".to_string(),
            };
            return Err(invalid_callback(hint));
        };

        let external = provider.authorize(&session, code).await.map_err(|err| {
            if err.is(ErrorKind::InternalIssue) {
                err
            } else {
                ErrorKind::InternalIssue.caused_by(err)
            }
        })?;
        debug!(stage = %FlowStage::ProfileFetched, provider = %flow.provider);

        let user = self.resolve_user(store, &flow.user_kind, external).await?;
        debug!(stage = %FlowStage::UserResolved, provider = %flow.provider, user_id = %user.id);
        Ok(user)
    }

    /// Existing identities are returned untouched; new ones get a user of
    /// `user_kind` bound to the provider key.
    ///
    /// # Errors
    /// Store failures propagate; a lost registration race is `Conflict`.
    pub async fn resolve_user(
        &self,
        store: &dyn UserStore,
        user_kind: &str,
        external: ExternalUser,
    ) -> Result<User> {
        let key = external.key()?;
        match store.get(&key.key).await {
            Ok(user) => return Ok(user),
            Err(err) if err.is(ErrorKind::NotFound) => {}
            Err(err) => return Err(err),
        }

        let mut user = User::new(user_kind, None, external.email.clone());
        user.data = external.profile();
        user.verified_at = Some(Utc::now());

        let user = store.register(user, vec![key]).await?;
        info!(user_id = %user.id, provider = %external.provider, "registered user from oauth2 login");
        Ok(user)
    }
}
