//! HTTP request handlers for all API endpoints.
//!
//! Handlers validate and deserialize the request, resolve the caller, delegate to the
//! services in [`crate::payments`] and serialize the result.
//!
//! # Handler Modules
//!
//! - [`payments`]: checkout, manual confirmation and payment lookups for the logged-in customer
//! - [`webhooks`]: gateway callbacks (VNPay return and IPN, Stripe webhooks)
//!
//! # Authentication
//!
//! Customer endpoints take a [`crate::api::models::users::CurrentUser`] extractor, which
//! accepts a bearer token or the session cookie. Gateway callbacks carry no session and are
//! authenticated by their signature.
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`] which converts to an HTTP status code and a JSON
//! `{message}` body. Gateway callbacks answer in the envelope each gateway expects instead.

pub mod payments;
pub mod webhooks;
