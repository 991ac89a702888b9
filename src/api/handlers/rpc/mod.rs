//! Bearer-authenticated RPC procedures, `/v1/rpc/<resource>.<procedure>`.
//!
//! Callers are resolved through the [`IdentityBridge`](crate::identity::IdentityBridge).
//! Failures use a single JSON shape:
//!
//! ```json
//! { "error": { "code": "UNAUTHORIZED", "message": "..." } }
//! ```

pub mod admin;
pub mod lists;
pub mod user;

use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::api::handlers::auth::UserRecord;
use crate::identity::{Caller, ExternalIdentity, IdentityBridge};

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("{0}")]
    BadRequest(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("insufficient privileges")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Details are logged, never returned.
    #[error("internal server error")]
    Internal(#[source] anyhow::Error),
}

impl RpcError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for RpcError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<sqlx::Error> for RpcError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct RpcErrorBody {
    pub error: RpcErrorDetail,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct RpcErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(err) => error!("RPC procedure failed: {err:#}"),
            Self::Unauthorized => debug!("RPC call without a usable bearer token"),
            _ => {}
        }
        let body = RpcErrorBody {
            error: RpcErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Resolve the caller; only a failing user lookup is an error.
pub(crate) async fn caller(bridge: &IdentityBridge, headers: &HeaderMap) -> Result<Caller, RpcError> {
    Ok(bridge.resolve(headers).await?)
}

/// Any verified identity, registered or not.
pub(crate) fn require_identity(caller: &Caller) -> Result<&ExternalIdentity, RpcError> {
    match caller {
        Caller::Anonymous => Err(RpcError::Unauthorized),
        Caller::Unregistered(identity) | Caller::Registered(identity, _) => Ok(identity),
    }
}

/// A verified identity that is linked to a local user.
pub(crate) fn require_user(caller: &Caller) -> Result<&UserRecord, RpcError> {
    match caller {
        Caller::Registered(_, user) => Ok(user),
        Caller::Anonymous | Caller::Unregistered(_) => Err(RpcError::Unauthorized),
    }
}
