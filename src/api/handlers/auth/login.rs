//! Email-token issuance.
//!
//! Flow Overview:
//! 1) Validate and normalize the email.
//! 2) Upsert the user and persist a hashed 8-digit code.
//! 3) Email the raw code; a send failure fails the request.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error};

use super::state::AuthState;
use super::storage::{insert_email_token, upsert_user_by_email};
use super::types::{LoginRequest, MessageResponse};
use super::utils::{normalize_email, valid_email};
use crate::api::email::EmailMessage;

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login code emailed", body = MessageResponse),
        (status = 400, description = "Missing or malformed email", body = String),
        (status = 500, description = "Storage or email failure", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let user_id = match upsert_user_by_email(&pool, &email).await {
        Ok(user_id) => user_id,
        Err(err) => {
            error!("Failed to upsert user: {err:#}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string()).into_response();
        }
    };

    let ttl_seconds = auth_state.config().email_token_ttl_seconds();
    let code = match insert_email_token(&pool, user_id, ttl_seconds).await {
        Ok(code) => code,
        Err(err) => {
            error!("Failed to store email token: {err:#}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string()).into_response();
        }
    };

    // The stored row is left to expire if delivery fails.
    let message = EmailMessage::login_code(&email, &code, ttl_seconds);
    if let Err(err) = auth_state.email_sender().send(&message).await {
        error!(%user_id, "Failed to send login email: {err:#}");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string()).into_response();
    }

    debug!(%user_id, "login code issued");
    (StatusCode::OK, Json(MessageResponse::new("Email token sent"))).into_response()
}

#[cfg(test)]
mod tests {
    use super::super::session::SessionKey;
    use super::super::state::{AuthConfig, AuthState, Environment};
    use super::super::types::LoginRequest;
    use super::login;
    use crate::api::email::LogEmailSender;
    use anyhow::Result;
    use axum::Json;
    use axum::extract::Extension;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn auth_state() -> Result<Arc<AuthState>> {
        let key = SessionKey::new(&SecretString::from("0123456789abcdef0123456789abcdef"))?;
        Ok(Arc::new(AuthState::new(
            AuthConfig::new(Environment::Development),
            key,
            Arc::new(LogEmailSender),
        )))
    }

    #[tokio::test]
    async fn login_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = login(Extension(pool), Extension(auth_state()?), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn login_rejects_malformed_email_before_io() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = login(
            Extension(pool),
            Extension(auth_state()?),
            Some(Json(LoginRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
