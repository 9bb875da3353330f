//! OAuth2 login: provider abstraction, the built-in providers and the
//! redirect/callback orchestrator.

mod client;
pub mod flow;
pub mod github;
pub mod google;
pub mod provider;

use std::sync::Arc;
use tracing::info;

pub use flow::{CallbackParams, FlowState, Orchestrator, FLOW_COOKIE_NAME};
pub use provider::{ExternalUser, Provider, ProviderRegistry, ProviderSession};

use super::{config::AuthConfig, error::Result};

/// Register every provider whose client id and secret are configured.
///
/// # Errors
/// Returns an error if a configured provider cannot be built.
pub fn registry_from_config(config: &AuthConfig) -> Result<ProviderRegistry> {
    let callback_url = config.callback_url();
    let timeout = config.oauth2_timeout();
    let mut registry = ProviderRegistry::new();

    if let Some(app) = config.github() {
        registry = registry.with_provider(Arc::new(github::GitHub::new(app, &callback_url, timeout)?));
    }
    if let Some(app) = config.google() {
        registry = registry.with_provider(Arc::new(google::Google::new(app, &callback_url, timeout)?));
    }

    info!(
        providers = ?registry.names().collect::<Vec<_>>(),
        "oauth2 providers registered"
    );
    Ok(registry)
}
