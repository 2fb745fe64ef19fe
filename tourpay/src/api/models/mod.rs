//! API request and response data models.
//!
//! These are kept apart from the database models in [`crate::db::models`] so the wire format
//! the frontend and the gateways see can evolve independently of storage. All models carry
//! `utoipa` annotations for the OpenAPI document.
//!
//! - [`payments`]: checkout and confirmation bodies, payment views, gateway callback envelopes
//! - [`users`]: the authenticated caller and their role

pub mod payments;
pub mod users;
