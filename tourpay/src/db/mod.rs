//! Persistence layer for tours, bookings and payment attempts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ payments service │  (checkout + confirmation)
//! └────────┬─────────┘
//!          │
//!          ↓
//! ┌──────────────────┐
//! │  Arc<dyn Ledger> │  (db::ledger - atomic per-booking transitions)
//! └────────┬─────────┘
//!     ┌────┴─────┐
//!     ↓          ↓
//! ┌────────┐ ┌──────────┐
//! │Postgres│ │In-memory │
//! └────────┘ └──────────┘
//! ```
//!
//! # Modules
//!
//! - [`ledger`]: the [`ledger::Ledger`] trait and its implementations
//! - [`models`]: database record structures matching table schemas
//! - [`errors`]: database-specific error types
//!
//! # Migrations
//!
//! Database migrations are managed by SQLx and located in the `migrations/` directory.
//! The [`crate::migrator`] function provides access to the migrator:
//!
//! ```ignore
//! tourpay::migrator().run(&pool).await?;
//! ```

pub mod errors;
pub mod ledger;
pub mod models;
