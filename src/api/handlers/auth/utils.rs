//! Small helpers for auth validation and token handling.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{Rng, RngCore, rngs::OsRng};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Number of decimal digits in an emailed login code.
pub(crate) const EMAIL_CODE_DIGITS: usize = 8;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Codes are fixed-width numeric strings so users can type them from an email.
pub(super) fn valid_email_code(code: &str) -> bool {
    code.len() == EMAIL_CODE_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

/// Create a new login code, uniform over `10^8`, zero padded.
pub(super) fn generate_email_code() -> String {
    let value: u32 = OsRng.gen_range(0..100_000_000);
    format!("{value:0width$}", width = EMAIL_CODE_DIGITS)
}

/// Create a new API token issued alongside the session cookie.
/// The raw value is never stored; the database keeps a hash.
pub(super) fn generate_api_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate api token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a token (email code or API token) so raw values never touch the database.
pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Current unix time in seconds.
pub(crate) fn now_unix_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
