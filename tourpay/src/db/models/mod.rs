//! Database record models matching table schemas.
//!
//! These models are returned by [`crate::db::ledger::Ledger`] implementations and are kept
//! separate from the API models in [`crate::api::models`] so storage and wire formats can
//! evolve independently.
//!
//! - [`tours`]: tour read model (title, per-passenger price)
//! - [`bookings`]: bookings, passengers and voucher snapshots
//! - [`payments`]: payment attempts and the results of ledger transitions

pub mod bookings;
pub mod payments;
pub mod tours;
