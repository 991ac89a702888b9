//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::storage::UserRecord;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthenticateRequest {
    pub email: String,
    #[serde(rename = "emailToken")]
    pub email_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email,
            name: user.name,
            is_admin: user.is_admin,
        }
    }
}

/// Body of a successful code exchange.
///
/// `apiToken` is a bearer credential for the cookie endpoints; it stops working
/// at logout together with the cookie.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthenticateResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    #[serde(rename = "apiToken")]
    pub api_token: String,
}
