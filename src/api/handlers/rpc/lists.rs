//! `lists.*` procedures: a registered caller's own lists.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::sync::Arc;
use tracing::{Instrument, debug, info_span};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{RpcError, RpcErrorBody, caller, require_user};
use crate::identity::IdentityBridge;

const MAX_NAME_CHARS: usize = 200;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ListResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateListRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeleteListRequest {
    pub id: Uuid,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct DeleteListResponse {
    pub id: String,
}

#[utoipa::path(
    get,
    path = "/v1/rpc/lists.list",
    responses(
        (status = 200, description = "Caller's lists, newest first", body = [ListResponse]),
        (status = 401, description = "Missing token or unregistered caller", body = RpcErrorBody)
    ),
    security(("bearer" = [])),
    tag = "rpc"
)]
pub async fn list(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    bridge: Extension<Arc<IdentityBridge>>,
) -> Result<impl IntoResponse, RpcError> {
    let caller = caller(&bridge, &headers).await?;
    let user = require_user(&caller)?;
    let lists = fetch_lists(&pool, user.id).await?;
    Ok(Json(lists))
}

#[utoipa::path(
    post,
    path = "/v1/rpc/lists.create",
    request_body = CreateListRequest,
    responses(
        (status = 201, description = "List created", body = ListResponse),
        (status = 400, description = "Invalid input", body = RpcErrorBody),
        (status = 401, description = "Missing token or unregistered caller", body = RpcErrorBody)
    ),
    security(("bearer" = [])),
    tag = "rpc"
)]
pub async fn create(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    bridge: Extension<Arc<IdentityBridge>>,
    payload: Option<Json<CreateListRequest>>,
) -> Result<impl IntoResponse, RpcError> {
    let caller = caller(&bridge, &headers).await?;
    let user = require_user(&caller)?;

    let Some(Json(request)) = payload else {
        return Err(RpcError::BadRequest("missing payload".to_string()));
    };
    let name = request.name.trim();
    if name.is_empty() {
        return Err(RpcError::BadRequest("name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(RpcError::BadRequest(format!(
            "name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    let description = request
        .description
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let created = insert_list(&pool, user.id, name, description).await?;
    debug!(list_id = %created.id, user_id = %user.id, "list created");
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    post,
    path = "/v1/rpc/lists.delete",
    request_body = DeleteListRequest,
    responses(
        (status = 200, description = "List deleted", body = DeleteListResponse),
        (status = 401, description = "Missing token or unregistered caller", body = RpcErrorBody),
        (status = 404, description = "No such list owned by the caller", body = RpcErrorBody)
    ),
    security(("bearer" = [])),
    tag = "rpc"
)]
pub async fn delete(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    bridge: Extension<Arc<IdentityBridge>>,
    payload: Option<Json<DeleteListRequest>>,
) -> Result<impl IntoResponse, RpcError> {
    let caller = caller(&bridge, &headers).await?;
    let user = require_user(&caller)?;

    let Some(Json(request)) = payload else {
        return Err(RpcError::BadRequest("missing payload".to_string()));
    };

    // Lists owned by someone else are indistinguishable from missing ones.
    if delete_list(&pool, user.id, request.id).await? {
        Ok(Json(DeleteListResponse {
            id: request.id.to_string(),
        }))
    } else {
        Err(RpcError::NotFound("list"))
    }
}

fn list_from_row(row: &PgRow) -> ListResponse {
    let id: Uuid = row.get("id");
    ListResponse {
        id: id.to_string(),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}

async fn fetch_lists(pool: &PgPool, owner_id: Uuid) -> Result<Vec<ListResponse>, sqlx::Error> {
    let query = r"
        SELECT id, name, description, created_at::text AS created_at
        FROM lists
        WHERE owner_id = $1
        ORDER BY created_at DESC
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(owner_id)
        .fetch_all(pool)
        .instrument(span)
        .await?;
    Ok(rows.iter().map(list_from_row).collect())
}

async fn insert_list(
    pool: &PgPool,
    owner_id: Uuid,
    name: &str,
    description: Option<&str>,
) -> Result<ListResponse, sqlx::Error> {
    let query = r"
        INSERT INTO lists (owner_id, name, description)
        VALUES ($1, $2, $3)
        RETURNING id, name, description, created_at::text AS created_at
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(owner_id)
        .bind(name)
        .bind(description)
        .fetch_one(pool)
        .instrument(span)
        .await?;
    Ok(list_from_row(&row))
}

async fn delete_list(pool: &PgPool, owner_id: Uuid, list_id: Uuid) -> Result<bool, sqlx::Error> {
    let query = "DELETE FROM lists WHERE id = $1 AND owner_id = $2";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(list_id)
        .bind(owner_id)
        .execute(pool)
        .instrument(span)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{bearer, bridge, error_code};
    use super::*;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn unregistered_caller_cannot_list() -> Result<()> {
        let response = list(bearer("new-token"), Extension(lazy_pool()?), Extension(bridge()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(response).await?, "UNAUTHORIZED");
        Ok(())
    }

    #[tokio::test]
    async fn create_requires_a_name() -> Result<()> {
        let response = create(
            bearer("user-token"),
            Extension(lazy_pool()?),
            Extension(bridge()),
            Some(Json(CreateListRequest {
                name: "   ".to_string(),
                description: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await?, "BAD_REQUEST");
        Ok(())
    }

    #[tokio::test]
    async fn delete_requires_payload() -> Result<()> {
        let response = delete(
            bearer("user-token"),
            Extension(lazy_pool()?),
            Extension(bridge()),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
