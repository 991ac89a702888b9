//! External-identity bridge.
//!
//! RPC callers present a bearer token issued by the hosted identity provider.
//! [`IdentityBridge`] verifies it and resolves the matching local user, with a
//! read-through cache in front of both lookups:
//!
//! * `identity:token:<sha256(token) hex>` holds the verified identity.
//! * `identity:user:<external id>` holds the local user row.
//!
//! Entries expire by TTL only. Cache failures degrade to a miss; provider
//! failures degrade to an anonymous caller. Database failures propagate.

pub mod cache;
pub mod provider;
pub mod users;

use anyhow::Result;
use axum::http::{HeaderMap, header::AUTHORIZATION};
use sha2::{Digest, Sha256};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::api::handlers::auth::UserRecord;
use cache::{Cache, get_json, set_json};
pub use cache::{CacheError, MemoryCache, RedisCache};
pub use provider::{ExternalIdentity, IdentityError, IdentityProvider, SupabaseProvider};
pub use users::{PgUserDirectory, UserDirectory};

const DEFAULT_IDENTITY_TTL_SECONDS: u64 = 300;
const DEFAULT_USER_TTL_SECONDS: u64 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    identity_ttl: Duration,
    user_ttl: Duration,
}

impl BridgeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            identity_ttl: Duration::from_secs(DEFAULT_IDENTITY_TTL_SECONDS),
            user_ttl: Duration::from_secs(DEFAULT_USER_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_identity_ttl_seconds(mut self, seconds: u64) -> Self {
        self.identity_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_user_ttl_seconds(mut self, seconds: u64) -> Self {
        self.user_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn identity_ttl(&self) -> Duration {
        self.identity_ttl
    }

    #[must_use]
    pub fn user_ttl(&self) -> Duration {
        self.user_ttl
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Who is calling an RPC procedure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Caller {
    /// No bearer token, or the provider did not vouch for it.
    Anonymous,
    /// Verified identity without a local user yet.
    Unregistered(ExternalIdentity),
    Registered(ExternalIdentity, UserRecord),
}

pub struct IdentityBridge {
    config: BridgeConfig,
    cache: Arc<dyn Cache>,
    provider: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserDirectory>,
}

impl IdentityBridge {
    pub fn new(
        config: BridgeConfig,
        cache: Arc<dyn Cache>,
        provider: Arc<dyn IdentityProvider>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            config,
            cache,
            provider,
            users,
        }
    }

    /// Resolve the caller from the `Authorization: Bearer` header.
    ///
    /// # Errors
    /// Returns an error only when the user lookup fails.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Caller> {
        let Some(token) = bearer_token(headers) else {
            return Ok(Caller::Anonymous);
        };
        let Some(identity) = self.resolve_identity(token).await else {
            return Ok(Caller::Anonymous);
        };
        match self.resolve_user(&identity).await? {
            Some(user) => Ok(Caller::Registered(identity, user)),
            None => Ok(Caller::Unregistered(identity)),
        }
    }

    /// Verify a bearer token, consulting the cache first.
    ///
    /// Provider failures are logged and yield `None`; they are never cached.
    pub async fn resolve_identity(&self, token: &str) -> Option<ExternalIdentity> {
        let key = identity_cache_key(token);
        match get_json::<ExternalIdentity>(self.cache.as_ref(), &key).await {
            Ok(Some(identity)) => {
                debug!(external_id = %identity.id, "identity cache hit");
                return Some(identity);
            }
            Ok(None) => {}
            Err(err) => warn!(backend = self.cache.backend_name(), "identity cache read failed: {err}"),
        }

        let identity = match self.provider.verify(token).await {
            Ok(identity) => identity,
            Err(IdentityError::Rejected) => {
                debug!("bearer token rejected by identity provider");
                return None;
            }
            Err(err) => {
                warn!("identity verification failed: {err}");
                return None;
            }
        };

        if let Err(err) =
            set_json(self.cache.as_ref(), &key, &identity, self.config.identity_ttl).await
        {
            warn!(backend = self.cache.backend_name(), "identity cache write failed: {err}");
        }
        Some(identity)
    }

    /// Find the local user for an identity, consulting the cache first.
    ///
    /// Absent users are not cached so a later registration is seen at once.
    ///
    /// # Errors
    /// Returns the directory error when the database lookup fails.
    pub async fn resolve_user(&self, identity: &ExternalIdentity) -> Result<Option<UserRecord>> {
        let key = user_cache_key(&identity.id);
        match get_json::<UserRecord>(self.cache.as_ref(), &key).await {
            Ok(Some(user)) => return Ok(Some(user)),
            Ok(None) => {}
            Err(err) => warn!(backend = self.cache.backend_name(), "user cache read failed: {err}"),
        }

        let Some(user) = self.users.find_by_external_id(&identity.id).await? else {
            return Ok(None);
        };
        self.cache_user(&key, &user).await;
        Ok(Some(user))
    }

    /// Create or link the local user and write it through the cache.
    ///
    /// # Errors
    /// Returns the directory error when the upsert fails.
    pub async fn register(&self, identity: &ExternalIdentity, email: &str) -> Result<UserRecord> {
        let user = self.users.register(email, &identity.id).await?;
        self.cache_user(&user_cache_key(&identity.id), &user).await;
        Ok(user)
    }

    async fn cache_user(&self, key: &str, user: &UserRecord) {
        if let Err(err) = set_json(self.cache.as_ref(), key, user, self.config.user_ttl).await {
            warn!(backend = self.cache.backend_name(), "user cache write failed: {err}");
        }
    }
}

/// Extract a non-empty bearer token.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Raw bearer tokens never appear in cache keys.
fn identity_cache_key(token: &str) -> String {
    format!("identity:token:{}", hex::encode(Sha256::digest(token.as_bytes())))
}

fn user_cache_key(external_id: &str) -> String {
    format!("identity:user:{external_id}")
}
