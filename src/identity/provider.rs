//! Hosted identity provider client.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{Instrument, info_span};
use url::Url;

const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity asserted by the provider for a bearer token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The provider answered and refused the token.
    #[error("identity token rejected")]
    Rejected,
    /// The provider could not be asked, or answered unexpectedly.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<ExternalIdentity, IdentityError>;
}

/// Supabase-style auth API: `GET {url}/auth/v1/user`.
#[derive(Debug)]
pub struct SupabaseProvider {
    client: Client,
    user_url: Url,
    api_key: SecretString,
}

impl SupabaseProvider {
    /// # Errors
    /// Returns an error if `base_url` is not a valid URL or the client cannot be built.
    pub fn new(base_url: &str, api_key: SecretString) -> anyhow::Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("invalid identity URL: {base_url}"))?;
        let user_url = base
            .join("/auth/v1/user")
            .context("failed to build identity user URL")?;
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(VERIFY_TIMEOUT)
            .build()
            .context("failed to build identity client")?;
        Ok(Self {
            client,
            user_url,
            api_key,
        })
    }

    #[must_use]
    pub fn user_url(&self) -> &Url {
        &self.user_url
    }
}

#[async_trait]
impl IdentityProvider for SupabaseProvider {
    async fn verify(&self, token: &str) -> Result<ExternalIdentity, IdentityError> {
        let span = info_span!("identity.verify", url = %self.user_url);
        let response = self
            .client
            .get(self.user_url.clone())
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(token)
            .send()
            .instrument(span)
            .await
            .map_err(|err| IdentityError::Unavailable(err.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<ExternalIdentity>()
                .await
                .map_err(|err| IdentityError::Unavailable(format!("invalid user payload: {err}"))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::Rejected),
            status => Err(IdentityError::Unavailable(format!("unexpected status {status}"))),
        }
    }
}
