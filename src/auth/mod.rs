//! Identity and session core.
//!
//! Users are found through keys (`email:..`, `username:..`, `github:..`),
//! proven by a password or an OAuth2 provider, and handed a stateless sealed
//! session token. Everything here is independent of HTTP except the error
//! type's response mapping.

pub mod config;
pub mod error;
pub mod keys;
pub mod mailer;
pub mod models;
pub mod oauth2;
pub mod password;
pub mod seal;
pub mod session;
pub mod store;
pub mod utils;

use std::{fmt, sync::Arc};

pub use config::{AuthConfig, OAuth2AppConfig};
pub use error::{Error, ErrorKind, Result};

use mailer::Mailer;
use oauth2::{Orchestrator, ProviderRegistry};
use seal::Sealer;
use session::SessionManager;
use store::UserStore;

/// Shared, read-only state handed to every handler.
pub struct AuthState {
    config: AuthConfig,
    store: Arc<dyn UserStore>,
    sessions: SessionManager,
    oauth2: Orchestrator,
    mailer: Arc<dyn Mailer>,
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("sessions", &self.sessions)
            .field("providers", self.oauth2.providers())
            .finish_non_exhaustive()
    }
}

impl AuthState {
    /// Wire the core from an already sanitised config.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn UserStore>,
        providers: ProviderRegistry,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let sealer = Sealer::new(config.signing_secret().clone());
        let sessions = SessionManager::new(sealer.clone(), config.session_ttl_seconds());
        Self {
            sessions,
            oauth2: Orchestrator::new(providers, sealer),
            config,
            store,
            mailer,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn UserStore {
        self.store.as_ref()
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub const fn oauth2(&self) -> &Orchestrator {
        &self.oauth2
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }
}
