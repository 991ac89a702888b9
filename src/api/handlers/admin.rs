//! Admin-only user listing for cookie sessions.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::auth::{AuthState, Session, require_admin, storage::list_users, types::UserResponse};

const USER_LIST_LIMIT: i64 = 100;

#[utoipa::path(
    get,
    path = "/v1/admin/users",
    responses(
        (status = 200, description = "Newest users first, at most 100.", body = [UserResponse]),
        (status = 401, description = "Missing, revoked or invalid session."),
        (status = 403, description = "Session is not an admin."),
    ),
    tag = "admin"
)]
pub async fn list_admin_users(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let session = match Session::load(&headers, &pool, auth_state.session_key()).await {
        Ok(session) => session,
        Err(err) => {
            error!("Failed to load admin session: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if let Err(rejection) = require_admin(&session) {
        return rejection.into_response();
    }

    match list_users(&pool, USER_LIST_LIMIT).await {
        Ok(users) => {
            let users: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
            (StatusCode::OK, Json(users)).into_response()
        }
        Err(err) => {
            error!("Failed to list users: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
