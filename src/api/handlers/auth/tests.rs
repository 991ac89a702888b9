//! Database-backed auth storage tests.
//!
//! Each test starts its own Postgres container and returns early when no
//! container runtime is available.

use super::storage::{
    RedeemOutcome, RejectReason, api_token_active, insert_email_code, insert_email_token,
    invalidate_api_token, list_users, lookup_api_token, lookup_user, redeem_email_token,
    upsert_external_user, upsert_user_by_email,
};
use super::utils::hash_token;
use anyhow::{Result, anyhow};
use sqlx::{PgPool, Row};
use test_support::{TestNetwork, postgres::PostgresContainer, runtime};
use uuid::Uuid;

const ROCCO_SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const EMAIL_TTL: i64 = 600;
const API_TTL: i64 = 43_200;

struct TestDb {
    _postgres: PostgresContainer,
    pool: PgPool,
}

impl TestDb {
    async fn new() -> Result<Self> {
        if let Err(err) = runtime::ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Err(err);
        }

        let network = TestNetwork::new("rocco-auth");
        let postgres = PostgresContainer::start(network.name()).await?;
        postgres.wait_until_ready().await?;
        postgres.apply_schema(ROCCO_SCHEMA_SQL).await?;
        let pool = postgres.pool(5).await?;

        Ok(Self {
            _postgres: postgres,
            pool,
        })
    }
}

async fn issue_code(pool: &PgPool, email: &str) -> Result<(Uuid, String)> {
    let user_id = upsert_user_by_email(pool, email).await?;
    let code = insert_email_token(pool, user_id, EMAIL_TTL).await?;
    Ok((user_id, code))
}

async fn token_valid(pool: &PgPool, code: &str) -> Result<bool> {
    let row = sqlx::query("SELECT valid FROM tokens WHERE token_hash = $1")
        .bind(hash_token(code))
        .fetch_one(pool)
        .await?;
    Ok(row.get("valid"))
}

fn rejected(outcome: &RedeemOutcome) -> Option<RejectReason> {
    match outcome {
        RedeemOutcome::Rejected(reason) => Some(*reason),
        RedeemOutcome::Redeemed(_) => None,
    }
}

#[tokio::test]
async fn upsert_user_is_idempotent() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let first = upsert_user_by_email(&db.pool, "ada@example.com").await?;
    let second = upsert_user_by_email(&db.pool, "ada@example.com").await?;
    assert_eq!(first, second);

    let user = lookup_user(&db.pool, first)
        .await?
        .ok_or_else(|| anyhow!("user missing"))?;
    assert_eq!(user.email, "ada@example.com");
    assert!(!user.is_admin);
    Ok(())
}

#[tokio::test]
async fn email_code_is_single_use() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let (user_id, code) = issue_code(&db.pool, "bob@example.com").await?;

    let first = redeem_email_token(&db.pool, "bob@example.com", &code, API_TTL).await?;
    let RedeemOutcome::Redeemed(grant) = first else {
        return Err(anyhow!("first redemption rejected"));
    };
    assert_eq!(grant.user.id, user_id);
    assert!(!grant.api_token.is_empty());
    assert!(!token_valid(&db.pool, &code).await?);

    let row = sqlx::query("SELECT kind::text AS kind, valid FROM tokens WHERE id = $1")
        .bind(grant.token_id)
        .fetch_one(&db.pool)
        .await?;
    assert_eq!(row.get::<String, _>("kind"), "api");
    assert!(row.get::<bool, _>("valid"));

    let second = redeem_email_token(&db.pool, "bob@example.com", &code, API_TTL).await?;
    assert_eq!(rejected(&second), Some(RejectReason::Invalidated));
    Ok(())
}

#[tokio::test]
async fn expired_code_is_rejected() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let (_, code) = issue_code(&db.pool, "carol@example.com").await?;
    sqlx::query("UPDATE tokens SET expires_at = NOW() - INTERVAL '1 second' WHERE token_hash = $1")
        .bind(hash_token(&code))
        .execute(&db.pool)
        .await?;

    let outcome = redeem_email_token(&db.pool, "carol@example.com", &code, API_TTL).await?;
    assert_eq!(rejected(&outcome), Some(RejectReason::Expired));
    // A rejected redemption leaves the row untouched.
    assert!(token_valid(&db.pool, &code).await?);
    Ok(())
}

#[tokio::test]
async fn mismatched_or_unknown_code_is_rejected() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let (_, code) = issue_code(&db.pool, "dave@example.com").await?;
    upsert_user_by_email(&db.pool, "eve@example.com").await?;

    let outcome = redeem_email_token(&db.pool, "eve@example.com", &code, API_TTL).await?;
    assert_eq!(rejected(&outcome), Some(RejectReason::EmailMismatch));

    let unknown = if code == "00000000" { "00000001" } else { "00000000" };
    let outcome = redeem_email_token(&db.pool, "dave@example.com", unknown, API_TTL).await?;
    assert_eq!(rejected(&outcome), Some(RejectReason::NotFound));
    Ok(())
}

#[tokio::test]
async fn concurrent_redemptions_have_one_winner() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let (_, code) = issue_code(&db.pool, "frank@example.com").await?;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let pool = db.pool.clone();
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            redeem_email_token(&pool, "frank@example.com", &code, API_TTL).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await?? {
            RedeemOutcome::Redeemed(_) => winners += 1,
            RedeemOutcome::Rejected(reason) => assert_eq!(reason, RejectReason::Invalidated),
        }
    }
    assert_eq!(winners, 1);

    let api_tokens: i64 = sqlx::query("SELECT COUNT(*) AS n FROM tokens WHERE kind = 'api'")
        .fetch_one(&db.pool)
        .await?
        .get("n");
    assert_eq!(api_tokens, 1);
    Ok(())
}

#[tokio::test]
async fn older_codes_stay_usable_until_expiry() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let (user_id, first) = issue_code(&db.pool, "gina@example.com").await?;
    let second = insert_email_token(&db.pool, user_id, EMAIL_TTL).await?;

    let outcome = redeem_email_token(&db.pool, "gina@example.com", &first, API_TTL).await?;
    assert!(rejected(&outcome).is_none());
    let outcome = redeem_email_token(&db.pool, "gina@example.com", &second, API_TTL).await?;
    assert!(rejected(&outcome).is_none());
    Ok(())
}

#[tokio::test]
async fn logout_invalidates_api_token_and_users_list_newest_first() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let (_, code) = issue_code(&db.pool, "hal@example.com").await?;
    let RedeemOutcome::Redeemed(grant) =
        redeem_email_token(&db.pool, "hal@example.com", &code, API_TTL).await?
    else {
        return Err(anyhow!("redemption rejected"));
    };
    invalidate_api_token(&db.pool, grant.token_id).await?;
    let valid: bool = sqlx::query("SELECT valid FROM tokens WHERE id = $1")
        .bind(grant.token_id)
        .fetch_one(&db.pool)
        .await?
        .get("valid");
    assert!(!valid);

    upsert_user_by_email(&db.pool, "ivy@example.com").await?;
    let users = list_users(&db.pool, 100).await?;
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].email, "ivy@example.com");
    Ok(())
}

#[tokio::test]
async fn revoked_api_token_no_longer_resolves() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let (user_id, code) = issue_code(&db.pool, "jay@example.com").await?;
    let RedeemOutcome::Redeemed(grant) =
        redeem_email_token(&db.pool, "jay@example.com", &code, API_TTL).await?
    else {
        return Err(anyhow!("redemption rejected"));
    };

    assert!(api_token_active(&db.pool, grant.token_id).await?);
    let found = lookup_api_token(&db.pool, &grant.api_token)
        .await?
        .ok_or_else(|| anyhow!("api token not found"))?;
    assert_eq!(found.token_id, grant.token_id);
    assert_eq!(found.user.id, user_id);
    assert!(found.expires_at > 0);
    // The email code is not an API token.
    assert!(lookup_api_token(&db.pool, &code).await?.is_none());

    invalidate_api_token(&db.pool, grant.token_id).await?;
    assert!(!api_token_active(&db.pool, grant.token_id).await?);
    assert!(lookup_api_token(&db.pool, &grant.api_token).await?.is_none());
    assert!(!api_token_active(&db.pool, Uuid::new_v4()).await?);
    Ok(())
}

#[tokio::test]
async fn spent_code_value_can_be_issued_again() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let kim = upsert_user_by_email(&db.pool, "kim@example.com").await?;
    let lee = upsert_user_by_email(&db.pool, "lee@example.com").await?;
    let code = "12345678";

    assert!(insert_email_code(&db.pool, kim, code, EMAIL_TTL).await?);
    // A live code cannot be handed out twice.
    assert!(!insert_email_code(&db.pool, lee, code, EMAIL_TTL).await?);

    sqlx::query("UPDATE tokens SET expires_at = NOW() - INTERVAL '1 second' WHERE token_hash = $1")
        .bind(hash_token(code))
        .execute(&db.pool)
        .await?;
    assert!(insert_email_code(&db.pool, lee, code, EMAIL_TTL).await?);

    let outcome = redeem_email_token(&db.pool, "lee@example.com", code, API_TTL).await?;
    assert!(rejected(&outcome).is_none());

    // Redeemed codes free their value too.
    assert!(insert_email_code(&db.pool, kim, code, EMAIL_TTL).await?);
    let outcome = redeem_email_token(&db.pool, "kim@example.com", code, API_TTL).await?;
    assert!(rejected(&outcome).is_none());

    let rows: i64 = sqlx::query("SELECT COUNT(*) AS n FROM tokens WHERE token_hash = $1")
        .bind(hash_token(code))
        .fetch_one(&db.pool)
        .await?
        .get("n");
    assert_eq!(rows, 3);
    Ok(())
}

#[tokio::test]
async fn external_user_follows_provider_email() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let first = upsert_external_user(&db.pool, "old@example.com", "ext-1").await?;
    assert_eq!(first.external_id.as_deref(), Some("ext-1"));

    let moved = upsert_external_user(&db.pool, "new@example.com", "ext-1").await?;
    assert_eq!(moved.id, first.id);
    assert_eq!(moved.email, "new@example.com");

    // The new address belongs to another local user: keep the link as it is.
    let other = upsert_user_by_email(&db.pool, "taken@example.com").await?;
    let kept = upsert_external_user(&db.pool, "taken@example.com", "ext-1").await?;
    assert_eq!(kept.id, first.id);
    assert_eq!(kept.email, "new@example.com");
    let untouched = lookup_user(&db.pool, other)
        .await?
        .ok_or_else(|| anyhow!("user missing"))?;
    assert!(untouched.external_id.is_none());

    let users = list_users(&db.pool, 100).await?;
    assert_eq!(users.len(), 2);
    Ok(())
}

#[tokio::test]
async fn external_user_links_existing_email_login() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let local = upsert_user_by_email(&db.pool, "max@example.com").await?;
    let linked = upsert_external_user(&db.pool, "max@example.com", "ext-max").await?;
    assert_eq!(linked.id, local);
    assert_eq!(linked.external_id.as_deref(), Some("ext-max"));
    Ok(())
}
