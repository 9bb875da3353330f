//! Stateless sessions: a sealed `{user_id}` envelope with a fixed TTL.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use super::{
    error::{ErrorKind, Result},
    models::User,
    seal::{Sealer, PURPOSE_SESSION},
};

/// Issued session token and its absolute expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Request-scoped identity placed by the authenticate middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentSession {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct Claims {
    uid: Uuid,
}

#[derive(Clone)]
pub struct SessionManager {
    sealer: Sealer,
    ttl_seconds: i64,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    #[must_use]
    pub const fn new(sealer: Sealer, ttl_seconds: i64) -> Self {
        Self {
            sealer,
            ttl_seconds,
        }
    }

    /// Issue a session for `user` expiring one TTL from now.
    ///
    /// # Errors
    /// Returns `InternalIssue` if sealing fails.
    pub fn create(&self, user: &User) -> Result<Session> {
        self.create_at(user.id, Utc::now())
    }

    /// # Errors
    /// Returns `InternalIssue` if sealing fails or the expiry is not representable.
    pub fn create_at(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Session> {
        let expires_at = Duration::try_seconds(self.ttl_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .and_then(|at| DateTime::from_timestamp(at.timestamp(), 0))
            .ok_or_else(|| ErrorKind::InternalIssue.hint("session expiry out of range"))?;
        let token = self
            .sealer
            .seal(PURPOSE_SESSION, &Claims { uid: user_id }, expires_at)
            .map_err(|err| ErrorKind::InternalIssue.caused_by(err))?;
        Ok(Session {
            token,
            user_id,
            expires_at,
        })
    }

    /// Resolve a presented token; anything invalid yields `None`.
    #[must_use]
    pub fn verify(&self, token: &str) -> Option<CurrentSession> {
        self.verify_at(token, Utc::now())
    }

    #[must_use]
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Option<CurrentSession> {
        match self.sealer.open::<Claims>(PURPOSE_SESSION, token, now) {
            Ok(opened) => Some(CurrentSession {
                user_id: opened.body.uid,
                expires_at: opened.expires_at,
            }),
            Err(err) => {
                debug!("session token rejected: {err}");
                None
            }
        }
    }
}
