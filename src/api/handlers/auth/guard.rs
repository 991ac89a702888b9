//! Authorization guards over a decoded [`Session`].
//!
//! Guards are pure: they never touch the database. Handlers run them before
//! any other work and turn a [`Rejection`] into a 401/403 response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::session::{Session, SessionClaims};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("authentication required")]
    Unauthorized,
    #[error("insufficient privileges")]
    Forbidden,
}

impl Rejection {
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// One step in a guard chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Session,
    Role(String),
    Admin,
}

impl Guard {
    /// Run this guard against `session`.
    ///
    /// # Errors
    /// Returns the rejection for the first unmet requirement.
    pub fn check<'a>(&self, session: &'a Session) -> Result<&'a SessionClaims, Rejection> {
        match self {
            Self::Session => require_session(session),
            Self::Role(role) => require_role(session, role),
            Self::Admin => require_admin(session),
        }
    }
}

/// # Errors
/// `Unauthorized` when there is no valid session.
pub fn require_session(session: &Session) -> Result<&SessionClaims, Rejection> {
    session.claims().ok_or(Rejection::Unauthorized)
}

/// # Errors
/// `Unauthorized` without a session, `Forbidden` when `role` is missing.
pub fn require_role<'a>(session: &'a Session, role: &str) -> Result<&'a SessionClaims, Rejection> {
    let claims = require_session(session)?;
    if claims.roles.iter().any(|held| held == role) {
        Ok(claims)
    } else {
        Err(Rejection::Forbidden)
    }
}

/// # Errors
/// `Unauthorized` without a session, `Forbidden` for non-admins.
pub fn require_admin(session: &Session) -> Result<&SessionClaims, Rejection> {
    let claims = require_session(session)?;
    if claims.is_admin {
        Ok(claims)
    } else {
        Err(Rejection::Forbidden)
    }
}

/// Run guards left to right; the first failure wins.
///
/// An empty chain still requires a session.
///
/// # Errors
/// Returns the first guard's rejection.
pub fn check_all<'a>(session: &'a Session, guards: &[Guard]) -> Result<&'a SessionClaims, Rejection> {
    let mut claims = require_session(session)?;
    for guard in guards {
        claims = guard.check(session)?;
    }
    Ok(claims)
}
