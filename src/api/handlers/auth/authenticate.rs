//! Email-code exchange.
//!
//! Flow Overview:
//! 1) Validate the email and the 8-digit code shape.
//! 2) Redeem the code and issue an API token in one transaction.
//! 3) Sign a session cookie that references the API token and return the
//!    token itself for bearer use.
//!
//! Every rejection answers the same 401 so callers cannot tell an unknown
//! code from a used, expired or mismatched one; the reason is only logged.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::session::{SessionClaims, session_cookie};
use super::state::AuthState;
use super::storage::{RedeemOutcome, redeem_email_token};
use super::types::{AuthenticateRequest, AuthenticateResponse, UserResponse};
use super::utils::{normalize_email, now_unix_seconds, valid_email, valid_email_code};

#[utoipa::path(
    post,
    path = "/v1/auth/authenticate",
    request_body = AuthenticateRequest,
    responses(
        (status = 200, description = "Session established; sets the session cookie", body = AuthenticateResponse),
        (status = 400, description = "Missing or malformed input", body = String),
        (status = 401, description = "Invalid token", body = String),
        (status = 500, description = "Storage failure", body = String)
    ),
    tag = "auth"
)]
pub async fn authenticate(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<AuthenticateRequest>>,
) -> impl IntoResponse {
    let request: AuthenticateRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    let code = request.email_token.trim();
    if !valid_email_code(code) {
        return (StatusCode::BAD_REQUEST, "Invalid token format".to_string()).into_response();
    }

    let config = auth_state.config();
    let grant = match redeem_email_token(&pool, &email, code, config.api_token_ttl_seconds()).await
    {
        Ok(RedeemOutcome::Redeemed(grant)) => grant,
        Ok(RedeemOutcome::Rejected(reason)) => {
            info!(reason = reason.as_str(), "email token rejected");
            return (StatusCode::UNAUTHORIZED, "Invalid token".to_string()).into_response();
        }
        Err(err) => {
            error!("Failed to redeem email token: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication failed".to_string(),
            )
                .into_response();
        }
    };

    let claims = SessionClaims {
        user_id: grant.user.id,
        is_admin: grant.user.is_admin,
        roles: Vec::new(),
        token_id: grant.token_id,
        expires_at: now_unix_seconds().saturating_add(config.session_ttl_seconds()),
    };
    let cookie = auth_state
        .session_key()
        .sign(&claims)
        .map_err(|err| err.to_string())
        .and_then(|value| session_cookie(config, &value).map_err(|err| err.to_string()));
    let cookie = match cookie {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication failed".to_string(),
            )
                .into_response();
        }
    };

    debug!(user_id = %grant.user.id, token_id = %grant.token_id, "session established");
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    let body = AuthenticateResponse {
        user: UserResponse::from(grant.user),
        api_token: grant.api_token,
    };
    (StatusCode::OK, headers, Json(body)).into_response()
}
