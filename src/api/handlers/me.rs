//! Current-user endpoint for cookie sessions.
//!
//! Flow Overview:
//! 1) Load the session (cookie or API bearer token) and require it to be live.
//! 2) Load the user row; a vanished user ends the session.
//!
//! A rejected request that still carried a session cookie gets it cleared.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error};

use super::auth::{
    AuthConfig, AuthState, Rejection, Session, require_session,
    session::{clear_session_cookie, has_session_cookie},
    storage::lookup_user,
    types::UserResponse,
};

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user.", body = UserResponse),
        (status = 401, description = "Missing, revoked or invalid session, or the user no longer exists."),
        (status = 500, description = "Storage failure."),
    ),
    tag = "me"
)]
pub async fn get_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let session = match Session::load(&headers, &pool, auth_state.session_key()).await {
        Ok(session) => session,
        Err(err) => {
            error!("Failed to load /v1/me session: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let claims = match require_session(&session) {
        Ok(claims) => claims,
        Err(rejection) => {
            debug!("/v1/me without a live session");
            if has_session_cookie(&headers) {
                return end_session(auth_state.config(), rejection);
            }
            return rejection.into_response();
        }
    };

    match lookup_user(&pool, claims.user_id).await {
        Ok(Some(user)) => (StatusCode::OK, Json(UserResponse::from(user))).into_response(),
        Ok(None) => {
            debug!(user_id = %claims.user_id, "session refers to a missing user");
            end_session(auth_state.config(), Rejection::Unauthorized)
        }
        Err(err) => {
            error!("Failed to fetch /v1/me user: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn end_session(config: &AuthConfig, rejection: Rejection) -> axum::response::Response {
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(config) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (response_headers, rejection).into_response()
}

#[cfg(test)]
mod tests {
    use super::get_me;
    use crate::api::email::LogEmailSender;
    use crate::api::handlers::auth::{AuthConfig, AuthState, Environment, SessionKey};
    use anyhow::Result;
    use axum::extract::Extension;
    use axum::http::{HeaderMap, HeaderValue, StatusCode, header::{COOKIE, SET_COOKIE}};
    use axum::response::IntoResponse;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn auth_state() -> Result<Arc<AuthState>> {
        let key = SessionKey::new(&SecretString::from("0123456789abcdef0123456789abcdef"))?;
        Ok(Arc::new(AuthState::new(
            AuthConfig::new(Environment::Production),
            key,
            Arc::new(LogEmailSender),
        )))
    }

    #[tokio::test]
    async fn me_without_cookie_is_unauthorized() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = get_me(HeaderMap::new(), Extension(pool), Extension(auth_state()?))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(SET_COOKIE).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn me_with_forged_cookie_is_unauthorized() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("rocco_session=e30.AAAA"));
        let response = get_me(headers, Extension(pool), Extension(auth_state()?))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let cleared = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(cleared.starts_with("rocco_session=;"), "{cleared}");
        Ok(())
    }
}
