//! The payment ledger: bookings, payment attempts and their transitions.
//!
//! The [`Ledger`] trait is the only way the payment core touches persistence. Reads are plain
//! lookups; every read-then-write sequence is a single trait method so that implementations
//! can run it inside one serialization boundary per booking:
//!
//! - [`Ledger::upsert_active_payment`]: find-or-create the active attempt of a booking
//! - [`Ledger::confirm_payment`]: mark a payment successful and its booking paid, atomically
//!
//! Two implementations exist:
//!
//! - [`postgres::PostgresLedger`]: row locks (`SELECT ... FOR UPDATE`) inside a transaction
//! - [`in_memory::InMemoryLedger`]: a single mutex-guarded state, used by tests and by
//!   development runs without a database

use async_trait::async_trait;

use crate::db::errors::Result;
use crate::db::models::{
    bookings::{BookingCreateDBRequest, BookingDBResponse},
    payments::{ActivePayment, ActivePaymentRequest, PaymentConfirmation, PaymentDBResponse},
    tours::{TourCreateDBRequest, TourDBResponse},
};
use crate::types::{BookingId, PaymentId, TourId};

pub mod in_memory;
pub mod postgres;

#[cfg(test)]
mod tests;

pub use in_memory::InMemoryLedger;
pub use postgres::PostgresLedger;

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Register a tour in the read model
    async fn create_tour(&self, request: &TourCreateDBRequest) -> Result<TourDBResponse>;

    async fn get_tour(&self, id: TourId) -> Result<Option<TourDBResponse>>;

    /// Create a booking in `pending`/`unpaid` state with no payment attached
    async fn create_booking(&self, request: &BookingCreateDBRequest) -> Result<BookingDBResponse>;

    async fn get_booking(&self, id: BookingId) -> Result<Option<BookingDBResponse>>;

    async fn get_payment(&self, id: PaymentId) -> Result<Option<PaymentDBResponse>>;

    /// Look up a payment by the provider-assigned transaction id
    async fn find_payment_by_transaction_id(&self, transaction_id: &str) -> Result<Option<PaymentDBResponse>>;

    /// Most recently created payment of a booking, whatever its status
    async fn latest_payment_for_booking(&self, booking_id: BookingId) -> Result<Option<PaymentDBResponse>>;

    /// All payment attempts of a booking, newest first
    async fn list_payments_for_booking(&self, booking_id: BookingId) -> Result<Vec<PaymentDBResponse>>;

    /// Find or open the active (pending or successful) payment of a booking.
    ///
    /// - active payment with the same method: returned unchanged
    /// - active payment with another method: method updated, status reset to pending
    /// - none: a pending payment of `request.amount` is created and set as the booking's
    ///   latest payment
    ///
    /// Runs atomically per booking; concurrent callers for the same booking observe each
    /// other's writes and never create two active payments.
    ///
    /// # Errors
    /// - `NotFound` if the booking doesn't exist
    async fn upsert_active_payment(&self, request: &ActivePaymentRequest) -> Result<ActivePayment>;

    /// Mark a payment successful and its booking paid + confirmed in one atomic write.
    ///
    /// If the payment is already successful nothing is written and the current state is
    /// returned with `newly_confirmed = false`. `transaction_id = None` keeps whatever
    /// transaction id the payment already had.
    ///
    /// # Errors
    /// - `NotFound` if the payment (or its booking) doesn't exist
    async fn confirm_payment(&self, payment_id: PaymentId, transaction_id: Option<&str>) -> Result<PaymentConfirmation>;

    /// Unconditionally set a payment to success with the given transaction id.
    ///
    /// Touches only the payment record. Returns `None` if the payment doesn't exist.
    async fn mark_payment_succeeded(&self, payment_id: PaymentId, transaction_id: Option<&str>) -> Result<Option<PaymentDBResponse>>;

    /// Set a booking to paid + confirmed without touching its payments.
    ///
    /// Returns `None` if the booking doesn't exist.
    async fn settle_booking(&self, booking_id: BookingId) -> Result<Option<BookingDBResponse>>;
}
