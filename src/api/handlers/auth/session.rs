//! Signed session cookie, the decoded [`Session`] value and logout.
//!
//! Cookie value layout: `base64url(json claims) "." base64url(hmac_sha256(claims))`.
//! Anything that fails to parse, verify or is past `exp` decodes to
//! [`Session::Unauthenticated`]; a bad cookie is never an error.
//!
//! A signed cookie only proves who the caller was. [`Session::load`] also
//! requires the API token named by `tid` to be valid, so logout revokes every
//! copy of the cookie.

use anyhow::{Result, anyhow};
use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::PgPool;
use std::{fmt, sync::Arc};
use tracing::{debug, error};
use uuid::Uuid;

use crate::identity::bearer_token;

use super::{
    state::{AuthConfig, AuthState},
    storage::{api_token_active, invalidate_api_token, lookup_api_token},
    types::MessageResponse,
    utils::now_unix_seconds,
};

pub(crate) const SESSION_COOKIE_NAME: &str = "rocco_session";
const MIN_SECRET_BYTES: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// HMAC key used to sign and verify session cookies.
pub struct SessionKey {
    secret: SecretSlice<u8>,
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey").finish_non_exhaustive()
    }
}

impl SessionKey {
    /// Build a key from the configured cookie secret.
    ///
    /// # Errors
    /// Returns an error if the secret is shorter than 32 bytes.
    pub fn new(secret: &SecretString) -> Result<Self> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.len() < MIN_SECRET_BYTES {
            return Err(anyhow!(
                "cookie secret must be at least {MIN_SECRET_BYTES} bytes"
            ));
        }
        Ok(Self {
            secret: SecretSlice::from(bytes.to_vec()),
        })
    }

    fn mac(&self) -> Result<HmacSha256> {
        <HmacSha256 as Mac>::new_from_slice(self.secret.expose_secret())
            .map_err(|err| anyhow!("invalid session key: {err}"))
    }

    /// Serialize and sign claims into a cookie value.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be serialized.
    pub fn sign(&self, claims: &SessionClaims) -> Result<String> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    /// Verify a cookie value and return its claims when still valid at `now`.
    #[must_use]
    pub fn verify(&self, value: &str, now_unix: i64) -> Option<SessionClaims> {
        let (payload, signature) = value.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = self.mac().ok()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let claims: SessionClaims = serde_json::from_slice(&bytes).ok()?;
        (claims.expires_at > now_unix).then_some(claims)
    }
}

/// Claims carried by an authenticated session cookie.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "uid")]
    pub user_id: Uuid,
    #[serde(rename = "adm")]
    pub is_admin: bool,
    #[serde(default)]
    pub roles: Vec<String>,
    /// API token issued when the session was created.
    #[serde(rename = "tid")]
    pub token_id: Uuid,
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

/// Decoded session state for a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Session {
    Unauthenticated,
    Authenticated(SessionClaims),
}

impl Session {
    /// Decode the session cookie from request headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, key: &SessionKey) -> Self {
        extract_session_cookie(headers)
            .and_then(|value| key.verify(&value, now_unix_seconds()))
            .map_or(Self::Unauthenticated, Self::Authenticated)
    }

    /// Resolve the caller from the session cookie, or from an API token sent as
    /// `Authorization: Bearer`.
    ///
    /// # Errors
    /// Returns an error if the token store cannot be queried.
    pub async fn load(headers: &HeaderMap, pool: &PgPool, key: &SessionKey) -> Result<Self> {
        if let Self::Authenticated(claims) = Self::from_headers(headers, key) {
            if api_token_active(pool, claims.token_id).await? {
                return Ok(Self::Authenticated(claims));
            }
            debug!(user_id = %claims.user_id, token_id = %claims.token_id, "session token revoked or expired");
            return Ok(Self::Unauthenticated);
        }

        let Some(token) = bearer_token(headers) else {
            return Ok(Self::Unauthenticated);
        };
        let session = lookup_api_token(pool, token).await?.map(|found| SessionClaims {
            user_id: found.user.id,
            is_admin: found.user.is_admin,
            roles: Vec::new(),
            token_id: found.token_id,
            expires_at: found.expires_at,
        });
        Ok(session.map_or(Self::Unauthenticated, Self::Authenticated))
    }

    #[must_use]
    pub fn claims(&self) -> Option<&SessionClaims> {
        match self {
            Self::Unauthenticated => None,
            Self::Authenticated(claims) => Some(claims),
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 200, description = "Session cleared", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let session = match Session::load(&headers, &pool, auth_state.session_key()).await {
        Ok(session) => session,
        Err(err) => {
            error!("Failed to load session for logout: {err:#}");
            Session::from_headers(&headers, auth_state.session_key())
        }
    };
    if let Session::Authenticated(claims) = session {
        // Best effort: the cookie is cleared regardless.
        match invalidate_api_token(&pool, claims.token_id).await {
            Ok(()) => debug!(user_id = %claims.user_id, "session token invalidated"),
            Err(err) => error!("Failed to invalidate session token: {err:#}"),
        }
    }

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(MessageResponse::new("Logged out")),
    )
        .into_response()
}

/// Build the `Set-Cookie` value for a signed session.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    value: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    // The API and the frontend live on different origins.
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={value}; Path=/; HttpOnly; SameSite=None; Max-Age={ttl_seconds}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=None; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Whether the request carries a non-empty session cookie, verified or not.
pub(crate) fn has_session_cookie(headers: &HeaderMap) -> bool {
    extract_session_cookie(headers).is_some()
}

fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == SESSION_COOKIE_NAME && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}
