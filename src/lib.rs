//! # Rocco (authentication and session service)
//!
//! `rocco` owns sign-in for the Rocco apps. It issues short-lived email codes,
//! exchanges them for cookie sessions, and resolves bearer tokens issued by an
//! external identity provider into local users.
//!
//! ## Email-token login
//!
//! - **Issue:** `POST /v1/auth/login` upserts the user by email, stores the SHA-256
//!   of a fresh 8-digit code and emails the code. Delivery failures are reported as
//!   `500`; the stored code simply expires.
//! - **Exchange:** `POST /v1/auth/authenticate` redeems the code inside a single
//!   transaction (row lock, new API token, code invalidated). Exactly one of any
//!   number of concurrent redemptions succeeds.
//! - **Uniform failures:** unknown, used, expired and mismatched codes all return
//!   `401 Invalid token`; the reason is only logged.
//!
//! ## Sessions
//!
//! Sessions live in an HMAC-signed, `HttpOnly`, `SameSite=None` cookie holding the
//! user id, admin flag, roles and the id of the API token issued at login. Guards
//! (`require_session`, `require_role`, `require_admin`) are pure checks over the
//! decoded [`api::handlers::auth::Session`].
//!
//! ## Identity bridge
//!
//! Bearer tokens on `/v1/rpc/*` are verified against the identity provider and
//! cached (Redis) for a short TTL, as is the local user row keyed by external id.
//! The cache is never authoritative; read or write failures only cost latency.

pub mod api;
pub mod cli;
pub mod identity;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
