//! HMAC-SHA256 sealed envelopes for cookies that must survive a round trip
//! through the client untouched.
//!
//! Wire form: `base64url(json{purpose, exp, body}) "." base64url(mac)`.
//! Both halves must be canonical unpadded base64url; the purpose binds an
//! envelope to one use so a flow cookie can never pass as a session.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const PURPOSE_SESSION: &str = "session";
pub const PURPOSE_OAUTH2_FLOW: &str = "oauth2-flow";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SealError {
    #[error("sealed value is malformed")]
    Malformed,
    #[error("sealed value signature mismatch")]
    Signature,
    #[error("sealed value purpose mismatch")]
    Purpose,
    #[error("sealed value expired")]
    Expired,
    #[error("failed to seal value: {0}")]
    Encode(String),
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    purpose: String,
    exp: i64,
    body: T,
}

/// A verified envelope body and its expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct Opened<T> {
    pub body: T,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Sealer {
    secret: SecretString,
}

impl fmt::Debug for Sealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sealer").finish_non_exhaustive()
    }
}

impl Sealer {
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    fn mac(&self) -> Result<HmacSha256, SealError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|err| SealError::Encode(err.to_string()))
    }

    /// Seal `body` for `purpose` until `expires_at` (second precision).
    ///
    /// # Errors
    /// Returns `SealError::Encode` if the body cannot be serialized.
    pub fn seal<T: Serialize>(
        &self,
        purpose: &str,
        body: &T,
        expires_at: DateTime<Utc>,
    ) -> Result<String, SealError> {
        let envelope = Envelope {
            purpose: purpose.to_string(),
            exp: expires_at.timestamp(),
            body,
        };
        let json = serde_json::to_vec(&envelope).map_err(|err| SealError::Encode(err.to_string()))?;
        let payload = Base64UrlUnpadded::encode_string(&json);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    /// Verify and decode an envelope sealed for `purpose`.
    ///
    /// # Errors
    /// Any tampering, wrong purpose or expiry at `now` is rejected.
    pub fn open<T: DeserializeOwned>(
        &self,
        purpose: &str,
        sealed: &str,
        now: DateTime<Utc>,
    ) -> Result<Opened<T>, SealError> {
        let (payload, signature) = sealed.split_once('.').ok_or(SealError::Malformed)?;
        let signature = decode_canonical(signature)?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| SealError::Signature)?;

        let json = decode_canonical(payload)?;
        let envelope: Envelope<T> =
            serde_json::from_slice(&json).map_err(|_| SealError::Malformed)?;

        if envelope.purpose != purpose {
            return Err(SealError::Purpose);
        }
        if envelope.exp <= now.timestamp() {
            return Err(SealError::Expired);
        }
        let expires_at = DateTime::from_timestamp(envelope.exp, 0).ok_or(SealError::Malformed)?;

        Ok(Opened {
            body: envelope.body,
            expires_at,
        })
    }
}

// Reject alternate encodings of the same bytes.
fn decode_canonical(part: &str) -> Result<Vec<u8>, SealError> {
    let bytes = Base64UrlUnpadded::decode_vec(part).map_err(|_| SealError::Malformed)?;
    if Base64UrlUnpadded::encode_string(&bytes) != part {
        return Err(SealError::Malformed);
    }
    Ok(bytes)
}
