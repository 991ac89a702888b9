use axum::{Json, extract::Extension, http::HeaderMap, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;

use super::{RpcError, RpcErrorBody, caller, require_user};
use crate::api::handlers::auth::{storage::list_users, types::UserResponse};
use crate::identity::IdentityBridge;

const USER_LIST_LIMIT: i64 = 100;

#[utoipa::path(
    get,
    path = "/v1/rpc/admin.users",
    responses(
        (status = 200, description = "Newest users first, at most 100", body = [UserResponse]),
        (status = 401, description = "Missing token or unregistered caller", body = RpcErrorBody),
        (status = 403, description = "Caller is not an admin", body = RpcErrorBody)
    ),
    security(("bearer" = [])),
    tag = "rpc"
)]
pub async fn users(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    bridge: Extension<Arc<IdentityBridge>>,
) -> Result<impl IntoResponse, RpcError> {
    let caller = caller(&bridge, &headers).await?;
    let user = require_user(&caller)?;
    if !user.is_admin {
        return Err(RpcError::Forbidden);
    }

    let users: Vec<UserResponse> = list_users(&pool, USER_LIST_LIMIT)
        .await?
        .into_iter()
        .map(UserResponse::from)
        .collect();
    Ok(Json(users))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{bearer, bridge, error_code};
    use super::*;
    use anyhow::Result;
    use axum::http::StatusCode;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn non_admin_is_forbidden() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = users(bearer("user-token"), Extension(pool.clone()), Extension(bridge()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(error_code(response).await?, "FORBIDDEN");

        let response = users(HeaderMap::new(), Extension(pool), Extension(bridge()))
            .await
            .into_response();
        assert_eq!(error_code(response).await?, "UNAUTHORIZED");
        Ok(())
    }
}
