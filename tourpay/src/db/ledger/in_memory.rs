//! In-memory ledger implementation.
//!
//! All state lives behind one async mutex, so every trait method is its own critical section
//! and the per-booking atomicity required by [`Ledger`] holds trivially. Suitable for tests
//! and single-process development runs; everything is lost on restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::Ledger;
use crate::db::errors::{DbError, Result};
use crate::db::models::{
    bookings::{BookingCreateDBRequest, BookingDBResponse, BookingPaymentStatus, BookingStatus},
    payments::{ActivePayment, ActivePaymentOutcome, ActivePaymentRequest, PaymentConfirmation, PaymentDBResponse, PaymentStatus},
    tours::{TourCreateDBRequest, TourDBResponse},
};
use crate::types::{BookingId, PaymentId, TourId};

#[derive(Default)]
struct State {
    tours: HashMap<TourId, TourDBResponse>,
    bookings: HashMap<BookingId, BookingDBResponse>,
    /// Insertion order doubles as creation order
    payments: Vec<PaymentDBResponse>,
}

impl State {
    fn payment_mut(&mut self, id: PaymentId) -> Option<&mut PaymentDBResponse> {
        self.payments.iter_mut().find(|p| p.id == id)
    }

    fn latest_payment(&self, booking_id: BookingId, filter: impl Fn(&PaymentDBResponse) -> bool) -> Option<usize> {
        self.payments.iter().rposition(|p| p.booking_id == booking_id && filter(p))
    }

    fn settle(&mut self, booking_id: BookingId, latest_payment_id: Option<PaymentId>) -> Option<BookingDBResponse> {
        let booking = self.bookings.get_mut(&booking_id)?;
        booking.payment_status = BookingPaymentStatus::Paid;
        booking.status = BookingStatus::Confirmed;
        if let Some(payment_id) = latest_payment_id {
            booking.latest_payment_id = Some(payment_id);
        }
        booking.updated_at = Utc::now();
        Some(booking.clone())
    }
}

/// In-memory implementation of the [`Ledger`] trait.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<State>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a booking as deleted the way the booking service does
    #[cfg(test)]
    pub async fn soft_delete_booking(&self, id: BookingId) {
        if let Some(booking) = self.state.lock().await.bookings.get_mut(&id) {
            booking.is_deleted = true;
        }
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn create_tour(&self, request: &TourCreateDBRequest) -> Result<TourDBResponse> {
        let tour = TourDBResponse {
            id: Uuid::new_v4(),
            title: request.title.clone(),
            price: request.price,
            created_at: Utc::now(),
        };
        self.state.lock().await.tours.insert(tour.id, tour.clone());
        Ok(tour)
    }

    async fn get_tour(&self, id: TourId) -> Result<Option<TourDBResponse>> {
        Ok(self.state.lock().await.tours.get(&id).cloned())
    }

    async fn create_booking(&self, request: &BookingCreateDBRequest) -> Result<BookingDBResponse> {
        let mut state = self.state.lock().await;

        if !state.tours.contains_key(&request.tour_id) {
            return Err(DbError::ForeignKeyViolation {
                constraint: Some("bookings_tour_id_fkey".to_string()),
                table: Some("bookings".to_string()),
                message: format!("tour {} does not exist", request.tour_id),
            });
        }

        let now = Utc::now();
        let booking = BookingDBResponse {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            tour_id: request.tour_id,
            passengers: request.passengers.clone(),
            status: BookingStatus::Pending,
            payment_status: BookingPaymentStatus::Unpaid,
            total: request.total,
            base_price: request.base_price,
            discount: request.discount,
            applied_voucher: request.applied_voucher.clone(),
            latest_payment_id: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<BookingDBResponse>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<PaymentDBResponse>> {
        Ok(self.state.lock().await.payments.iter().find(|p| p.id == id).cloned())
    }

    async fn find_payment_by_transaction_id(&self, transaction_id: &str) -> Result<Option<PaymentDBResponse>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .rev()
            .find(|p| p.transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn latest_payment_for_booking(&self, booking_id: BookingId) -> Result<Option<PaymentDBResponse>> {
        let state = self.state.lock().await;
        Ok(state.latest_payment(booking_id, |_| true).map(|idx| state.payments[idx].clone()))
    }

    async fn list_payments_for_booking(&self, booking_id: BookingId) -> Result<Vec<PaymentDBResponse>> {
        let state = self.state.lock().await;
        Ok(state.payments.iter().rev().filter(|p| p.booking_id == booking_id).cloned().collect())
    }

    async fn upsert_active_payment(&self, request: &ActivePaymentRequest) -> Result<ActivePayment> {
        let mut state = self.state.lock().await;

        if !state.bookings.contains_key(&request.booking_id) {
            return Err(DbError::NotFound);
        }

        if let Some(idx) = state.latest_payment(request.booking_id, |p| p.status.is_active()) {
            let payment = &mut state.payments[idx];
            if payment.method == request.method {
                return Ok(ActivePayment {
                    payment: payment.clone(),
                    outcome: ActivePaymentOutcome::Reused,
                });
            }

            payment.method = request.method.clone();
            payment.status = PaymentStatus::Pending;
            payment.updated_at = Utc::now();
            return Ok(ActivePayment {
                payment: payment.clone(),
                outcome: ActivePaymentOutcome::MethodSwitched,
            });
        }

        let now = Utc::now();
        let payment = PaymentDBResponse {
            id: Uuid::new_v4(),
            booking_id: request.booking_id,
            method: request.method.clone(),
            amount: request.amount,
            status: PaymentStatus::Pending,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        };
        state.payments.push(payment.clone());

        if let Some(booking) = state.bookings.get_mut(&request.booking_id) {
            booking.latest_payment_id = Some(payment.id);
            booking.updated_at = now;
        }

        Ok(ActivePayment {
            payment,
            outcome: ActivePaymentOutcome::Created,
        })
    }

    async fn confirm_payment(&self, payment_id: PaymentId, transaction_id: Option<&str>) -> Result<PaymentConfirmation> {
        let mut state = self.state.lock().await;

        let current = state.payments.iter().find(|p| p.id == payment_id).cloned().ok_or(DbError::NotFound)?;
        let booking = state.bookings.get(&current.booking_id).cloned().ok_or(DbError::NotFound)?;

        if current.status == PaymentStatus::Success {
            return Ok(PaymentConfirmation {
                payment: current,
                booking,
                newly_confirmed: false,
            });
        }

        let payment = state.payment_mut(payment_id).ok_or(DbError::NotFound)?;
        payment.status = PaymentStatus::Success;
        if let Some(transaction_id) = transaction_id {
            payment.transaction_id = Some(transaction_id.to_string());
        }
        payment.updated_at = Utc::now();
        let payment = payment.clone();

        let booking = state.settle(payment.booking_id, Some(payment.id)).ok_or(DbError::NotFound)?;

        Ok(PaymentConfirmation {
            payment,
            booking,
            newly_confirmed: true,
        })
    }

    async fn mark_payment_succeeded(&self, payment_id: PaymentId, transaction_id: Option<&str>) -> Result<Option<PaymentDBResponse>> {
        let mut state = self.state.lock().await;
        Ok(state.payment_mut(payment_id).map(|payment| {
            payment.status = PaymentStatus::Success;
            payment.transaction_id = transaction_id.map(str::to_string);
            payment.updated_at = Utc::now();
            payment.clone()
        }))
    }

    async fn settle_booking(&self, booking_id: BookingId) -> Result<Option<BookingDBResponse>> {
        Ok(self.state.lock().await.settle(booking_id, None))
    }
}
