//! Caller authentication.
//!
//! Sessions are HS256 JWTs signed with `secret_key` and issued by the identity service. A
//! request authenticates with either:
//!
//! - `Authorization: Bearer <jwt>` (API clients)
//! - the session cookie named by `auth.cookie_name` (browsers)
//!
//! Handlers take a [`CurrentUser`](crate::api::models::users::CurrentUser) argument to require
//! authentication; extraction fails with 401 when neither credential is valid.
//!
//! # Modules
//!
//! - [`session`]: token claims, creation and verification
//! - [`current_user`]: the axum extractor

pub mod current_user;
pub mod session;
