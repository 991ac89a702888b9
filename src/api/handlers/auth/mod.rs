//! Email-token login, cookie sessions and request guards.
//!
//! ## Flow
//!
//! 1. `POST /v1/auth/login` upserts the user, stores the SHA-256 of a fresh
//!    8-digit code and emails the raw code.
//! 2. `POST /v1/auth/authenticate` redeems the code. Inside one transaction the
//!    code row is locked, an API token is inserted and the code is marked
//!    invalid, so a code can be redeemed at most once even under concurrency.
//! 3. The response sets `rocco_session`, an HMAC-signed cookie carrying the
//!    user id, admin flag, roles and the API token id.
//!    The raw API token is returned in the body for `Authorization: Bearer` use.
//! 4. `POST /v1/auth/logout` invalidates that API token and clears the cookie.
//!    [`Session::load`] checks the token on every request, so a replayed cookie
//!    is rejected after logout.
//!
//! Guards in [`guard`] operate on the loaded [`Session`] only.

pub(crate) mod authenticate;
pub mod guard;
pub(crate) mod login;
pub(crate) mod session;
mod state;
pub(crate) mod storage;
pub(crate) mod types;
pub(crate) mod utils;

pub use guard::{Guard, Rejection, check_all, require_admin, require_role, require_session};
pub use session::{Session, SessionClaims, SessionKey};
pub use state::{AuthConfig, AuthState, Environment};
pub use storage::UserRecord;

#[cfg(test)]
mod tests;
