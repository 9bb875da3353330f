//! Delivery of email verification links.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;
use url::Url;
use uuid::Uuid;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `link` to `to`; failures are logged by the caller and do not
    /// undo the registration.
    async fn send_verification(&self, to: &str, link: &str) -> Result<()>;
}

/// Local dev mailer that logs the link instead of sending it.
#[derive(Clone, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification(&self, to: &str, link: &str) -> Result<()> {
        info!(to_email = %to, link = %link, "verification mail stub");
        Ok(())
    }
}

/// `<base-url>/verify?id=<user id>&token=<token>`
///
/// # Errors
/// Returns an error if `base_url` is not a valid URL.
pub fn verification_link(base_url: &str, id: Uuid, token: &str) -> Result<String> {
    let mut url = Url::parse(&format!("{}/verify", base_url.trim_end_matches('/')))?;
    url.query_pairs_mut()
        .append_pair("id", &id.to_string())
        .append_pair("token", token);
    Ok(url.into())
}
