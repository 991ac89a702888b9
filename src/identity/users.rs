//! Local user lookup for externally authenticated callers.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::api::handlers::auth::UserRecord;
use crate::api::handlers::auth::storage::{lookup_user_by_external_id, upsert_external_user};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<UserRecord>>;

    /// Create or link the local user for `email` to `external_id`.
    async fn register(&self, email: &str, external_id: &str) -> Result<UserRecord>;
}

#[derive(Clone, Debug)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<UserRecord>> {
        lookup_user_by_external_id(&self.pool, external_id).await
    }

    async fn register(&self, email: &str, external_id: &str) -> Result<UserRecord> {
        upsert_external_user(&self.pool, email, external_id).await
    }
}
