//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! Everything is mounted under `/api`:
//!
//! - **Payments** (`/api/payments/*`, `/api/bookings/{id}/payments`): checkout, confirmation
//!   and lookups, for the booking's owner only
//! - **Gateway callbacks** (`/api/payments/vnpay/*`, `/api/payments/stripe/webhook`): called
//!   by VNPay and Stripe
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with `utoipa`; the document is served at
//! `/api/openapi.json`.

pub mod handlers;
pub mod models;
