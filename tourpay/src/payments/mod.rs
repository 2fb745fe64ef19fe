//! Payment services sitting between the HTTP handlers and the ledger.
//!
//! - [`checkout`]: open or resume the active payment of a booking and build the gateway
//!   redirect
//! - [`confirmation`]: settle payments from the manual confirm call and from gateway callbacks
//!
//! Both take the ledger as `&dyn Ledger` and the caller as an already authenticated
//! [`crate::api::models::users::CurrentUser`], so they run the same over Postgres and the
//! in-memory ledger.

pub mod checkout;
pub mod confirmation;
