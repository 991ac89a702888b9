use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use super::{RpcError, RpcErrorBody, caller, require_identity};
use crate::api::handlers::auth::{types::UserResponse, utils::normalize_email, utils::valid_email};
use crate::identity::{Caller, IdentityBridge};

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct IdentityResponse {
    pub id: String,
    pub email: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct WhoAmIResponse {
    pub identity: IdentityResponse,
    /// `null` until the caller registers.
    pub user: Option<UserResponse>,
}

#[utoipa::path(
    get,
    path = "/v1/rpc/user.me",
    responses(
        (status = 200, description = "Caller identity and local user, if any", body = WhoAmIResponse),
        (status = 401, description = "Missing or rejected bearer token", body = RpcErrorBody)
    ),
    security(("bearer" = [])),
    tag = "rpc"
)]
pub async fn me(
    headers: HeaderMap,
    bridge: Extension<Arc<IdentityBridge>>,
) -> Result<impl IntoResponse, RpcError> {
    let caller = caller(&bridge, &headers).await?;
    let identity = require_identity(&caller)?;
    let user = match &caller {
        Caller::Registered(_, user) => Some(UserResponse::from(user.clone())),
        Caller::Anonymous | Caller::Unregistered(_) => None,
    };
    Ok(Json(WhoAmIResponse {
        identity: IdentityResponse {
            id: identity.id.clone(),
            email: identity.email.clone(),
        },
        user,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/rpc/user.register",
    responses(
        (status = 200, description = "Local user created or linked", body = UserResponse),
        (status = 400, description = "Identity carries no usable email", body = RpcErrorBody),
        (status = 401, description = "Missing or rejected bearer token", body = RpcErrorBody)
    ),
    security(("bearer" = [])),
    tag = "rpc"
)]
pub async fn register(
    headers: HeaderMap,
    bridge: Extension<Arc<IdentityBridge>>,
) -> Result<impl IntoResponse, RpcError> {
    let caller = caller(&bridge, &headers).await?;
    let identity = require_identity(&caller)?;

    let email = identity
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|email| valid_email(email))
        .ok_or_else(|| RpcError::BadRequest("identity has no valid email".to_string()))?;

    let user = bridge.register(identity, &email).await?;
    info!(user_id = %user.id, external_id = %identity.id, "external identity registered");
    Ok((StatusCode::OK, Json(UserResponse::from(user))))
}
