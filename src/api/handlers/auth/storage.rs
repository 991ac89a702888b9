//! Database helpers for users, email codes and API tokens.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{Instrument, info_span, warn};
use uuid::Uuid;

use super::utils::{generate_api_token, generate_email_code, hash_token, is_unique_violation};

const USER_COLUMNS: &str = "users.id, users.email, users.name, users.is_admin, users.external_id";

/// Local user row; also the value cached by the identity bridge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub is_admin: bool,
    pub external_id: Option<String>,
}

impl UserRecord {
    fn from_row(row: &PgRow) -> Self {
        Self {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            is_admin: row.get("is_admin"),
            external_id: row.get("external_id"),
        }
    }
}

/// Why an email code could not be redeemed. Only ever logged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RejectReason {
    NotFound,
    Invalidated,
    Expired,
    EmailMismatch,
}

impl RejectReason {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Invalidated => "invalidated",
            Self::Expired => "expired",
            Self::EmailMismatch => "email_mismatch",
        }
    }
}

/// Result of a successful code exchange.
#[derive(Debug)]
pub(crate) struct SessionGrant {
    pub(crate) user: UserRecord,
    pub(crate) token_id: Uuid,
    pub(crate) api_token: String,
}

#[derive(Debug)]
pub(crate) enum RedeemOutcome {
    Redeemed(SessionGrant),
    Rejected(RejectReason),
}

/// Create the user if absent and return its id.
pub(crate) async fn upsert_user_by_email(pool: &PgPool, email: &str) -> Result<Uuid> {
    let query = r"
        INSERT INTO users (email)
        VALUES ($1)
        ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
        RETURNING id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to upsert user")?;

    Ok(row.get("id"))
}

/// Store a fresh email code for the user and return the raw code.
///
/// Earlier codes stay untouched; they expire on their own.
pub(crate) async fn insert_email_token(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    // 10^8 codes: collisions with an outstanding code are rare but possible.
    for _ in 0..3 {
        let code = generate_email_code();
        if insert_email_code(pool, user_id, &code, ttl_seconds).await? {
            return Ok(code);
        }
    }

    Err(anyhow!("failed to generate unique email token"))
}

/// Insert `code` for the user; `false` when another live code holds the value.
///
/// An expired holder of the same value is retired first so the value can be
/// reused without waiting for a cleanup job.
pub(crate) async fn insert_email_code(
    pool: &PgPool,
    user_id: Uuid,
    code: &str,
    ttl_seconds: i64,
) -> Result<bool> {
    let token_hash = hash_token(code);

    let query = r"
        UPDATE tokens SET valid = FALSE
        WHERE token_hash = $1
          AND kind = 'email'
          AND valid
          AND expires_at <= NOW()
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(&token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to retire expired email token")?;

    let query = r"
        INSERT INTO tokens (user_id, kind, token_hash, expires_at)
        VALUES ($1, 'email', $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(&token_hash)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(true),
        Err(err) if is_unique_violation(&err) => Ok(false),
        Err(err) => Err(err).context("failed to insert email token"),
    }
}

/// Exchange an email code for an API token in a single transaction.
///
/// The code row is locked (`FOR UPDATE`) so concurrent redemptions serialize;
/// the loser observes the code as invalidated. Issuing the API token and
/// invalidating the code commit together or not at all.
pub(crate) async fn redeem_email_token(
    pool: &PgPool,
    email: &str,
    code: &str,
    api_token_ttl_seconds: i64,
) -> Result<RedeemOutcome> {
    let mut tx = pool.begin().await.context("begin redeem transaction")?;

    let query = r"
        SELECT tokens.id AS token_id,
               tokens.valid,
               tokens.expires_at <= NOW() AS expired,
               users.id, users.email, users.name, users.is_admin, users.external_id
        FROM tokens
        JOIN users ON users.id = tokens.user_id
        WHERE tokens.token_hash = $1
          AND tokens.kind = 'email'
        ORDER BY tokens.valid DESC, tokens.created_at DESC
        LIMIT 1
        FOR UPDATE OF tokens
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(hash_token(code))
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup email token")?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(RedeemOutcome::Rejected(RejectReason::NotFound));
    };

    let email_token_id: Uuid = row.get("token_id");
    let valid: bool = row.get("valid");
    let expired: bool = row.get("expired");
    let user = UserRecord::from_row(&row);

    let rejection = if !valid {
        Some(RejectReason::Invalidated)
    } else if expired {
        Some(RejectReason::Expired)
    } else if user.email != email {
        Some(RejectReason::EmailMismatch)
    } else {
        None
    };
    if let Some(reason) = rejection {
        let _ = tx.rollback().await;
        return Ok(RedeemOutcome::Rejected(reason));
    }

    let api_token = generate_api_token()?;
    let query = r"
        INSERT INTO tokens (user_id, kind, token_hash, expires_at)
        VALUES ($1, 'api', $2, NOW() + ($3 * INTERVAL '1 second'))
        RETURNING id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let inserted = sqlx::query(query)
        .bind(user.id)
        .bind(hash_token(&api_token))
        .bind(api_token_ttl_seconds)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert api token")?;
    let token_id: Uuid = inserted.get("id");

    let query = "UPDATE tokens SET valid = FALSE WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email_token_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to invalidate email token")?;

    tx.commit().await.context("commit redeem transaction")?;

    Ok(RedeemOutcome::Redeemed(SessionGrant {
        user,
        token_id,
        api_token,
    }))
}

/// Mark a session's API token invalid (logout).
pub(crate) async fn invalidate_api_token(pool: &PgPool, token_id: Uuid) -> Result<()> {
    let query = "UPDATE tokens SET valid = FALSE WHERE id = $1 AND kind = 'api'";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to invalidate api token")?;
    Ok(())
}

/// Whether the API token behind a session is still valid and unexpired.
pub(crate) async fn api_token_active(pool: &PgPool, token_id: Uuid) -> Result<bool> {
    let query = r"
        SELECT EXISTS (
            SELECT 1 FROM tokens
            WHERE id = $1
              AND kind = 'api'
              AND valid
              AND expires_at > NOW()
        ) AS active
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_id)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to check api token")?;

    Ok(row.get("active"))
}

/// A live API token presented as a bearer credential.
#[derive(Debug)]
pub(crate) struct ApiTokenSession {
    pub(crate) token_id: Uuid,
    pub(crate) user: UserRecord,
    pub(crate) expires_at: i64,
}

/// Resolve a raw API token to its owner when it is valid and unexpired.
pub(crate) async fn lookup_api_token(pool: &PgPool, api_token: &str) -> Result<Option<ApiTokenSession>> {
    let query = format!(
        r"
        SELECT tokens.id AS token_id,
               EXTRACT(EPOCH FROM tokens.expires_at)::BIGINT AS token_expires_at,
               {USER_COLUMNS}
        FROM tokens
        JOIN users ON users.id = tokens.user_id
        WHERE tokens.token_hash = $1
          AND tokens.kind = 'api'
          AND tokens.valid
          AND tokens.expires_at > NOW()
    "
    );
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(hash_token(api_token))
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup api token")?;

    Ok(row.map(|row| ApiTokenSession {
        token_id: row.get("token_id"),
        expires_at: row.get("token_expires_at"),
        user: UserRecord::from_row(&row),
    }))
}

pub(crate) async fn lookup_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE users.id = $1");
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user")?;

    Ok(row.as_ref().map(UserRecord::from_row))
}

pub(crate) async fn lookup_user_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE users.external_id = $1");
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(external_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by external id")?;

    Ok(row.as_ref().map(UserRecord::from_row))
}

/// Link (or create) the local user for an external identity.
///
/// A user already linked to `external_id` keeps its row and follows the
/// provider's email, unless that email belongs to another local user. Otherwise
/// the identity is linked to the user holding `email`, or a new user is created.
pub(crate) async fn upsert_external_user(
    pool: &PgPool,
    email: &str,
    external_id: &str,
) -> Result<UserRecord> {
    if let Some(linked) = lookup_user_by_external_id(pool, external_id).await? {
        return follow_external_email(pool, linked, email).await;
    }

    let query = format!(
        r"
        INSERT INTO users (email, external_id)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE
            SET external_id = EXCLUDED.external_id,
                updated_at = NOW()
        RETURNING {USER_COLUMNS}
    "
    );
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let result = sqlx::query(&query)
        .bind(email)
        .bind(external_id)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match result {
        Ok(row) => Ok(UserRecord::from_row(&row)),
        // A concurrent registration linked the identity first.
        Err(err) if is_unique_violation(&err) => lookup_user_by_external_id(pool, external_id)
            .await?
            .ok_or_else(|| anyhow!("external user vanished after link conflict")),
        Err(err) => Err(err).context("failed to upsert external user"),
    }
}

async fn follow_external_email(pool: &PgPool, linked: UserRecord, email: &str) -> Result<UserRecord> {
    if linked.email == email {
        return Ok(linked);
    }

    let query = format!(
        r"
        UPDATE users
        SET email = $1, updated_at = NOW()
        WHERE users.id = $2
          AND NOT EXISTS (SELECT 1 FROM users AS holder WHERE holder.email = $1)
        RETURNING {USER_COLUMNS}
    "
    );
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let result = sqlx::query(&query)
        .bind(email)
        .bind(linked.id)
        .fetch_optional(pool)
        .instrument(span)
        .await;

    match result {
        Ok(Some(row)) => Ok(UserRecord::from_row(&row)),
        Ok(None) => {
            warn!(user_id = %linked.id, "provider email already belongs to another user; keeping the linked email");
            Ok(linked)
        }
        Err(err) if is_unique_violation(&err) => {
            warn!(user_id = %linked.id, "provider email taken concurrently; keeping the linked email");
            Ok(linked)
        }
        Err(err) => Err(err).context("failed to update external user email"),
    }
}

pub(crate) async fn list_users(pool: &PgPool, limit: i64) -> Result<Vec<UserRecord>> {
    let query =
        format!("SELECT {USER_COLUMNS} FROM users ORDER BY users.created_at DESC LIMIT $1");
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(limit)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list users")?;

    Ok(rows.iter().map(UserRecord::from_row).collect())
}
