//! API handlers for Rocco.
//!
//! Cookie-session routes (`/v1/auth/*`, `/v1/me`, `/v1/admin/*`) live in
//! [`auth`], [`me`] and [`admin`]; bearer-token procedures live in [`rpc`].

pub mod admin;
pub mod auth;
pub mod health;
pub mod me;
pub mod root;
pub mod rpc;
