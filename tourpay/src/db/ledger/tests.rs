//! Behavioural tests shared by every [`Ledger`] implementation.
//!
//! Each scenario takes a `&dyn Ledger`; the in-memory runs need nothing, the Postgres runs
//! use `#[sqlx::test]` which provisions a fresh migrated database per test.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::{InMemoryLedger, Ledger, PostgresLedger};
use crate::db::errors::DbError;
use crate::db::models::{
    bookings::{BookingCreateDBRequest, BookingDBResponse, BookingPaymentStatus, BookingStatus, Passenger, PassengerType},
    payments::{ActivePaymentOutcome, ActivePaymentRequest, PaymentStatus},
    tours::TourCreateDBRequest,
};

async fn seed_booking(ledger: &dyn Ledger, passengers: usize) -> BookingDBResponse {
    let tour = ledger
        .create_tour(&TourCreateDBRequest {
            title: "Ha Long Bay".to_string(),
            price: Decimal::new(150, 0),
        })
        .await
        .unwrap();

    let passengers: Vec<Passenger> = (0..passengers)
        .map(|i| Passenger {
            name: format!("Passenger {i}"),
            age: 30,
            passenger_type: PassengerType::Adult,
        })
        .collect();

    ledger
        .create_booking(&BookingCreateDBRequest {
            user_id: Uuid::new_v4(),
            tour_id: tour.id,
            passengers,
            total: Decimal::new(300, 0),
            base_price: Decimal::new(300, 0),
            discount: Decimal::ZERO,
            applied_voucher: None,
        })
        .await
        .unwrap()
}

fn request(booking: &BookingDBResponse, method: &str) -> ActivePaymentRequest {
    ActivePaymentRequest {
        booking_id: booking.id,
        method: method.to_string(),
        amount: 30000,
    }
}

async fn first_checkout_creates_pending_payment(ledger: &dyn Ledger) {
    let booking = seed_booking(ledger, 2).await;
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.payment_status, BookingPaymentStatus::Unpaid);

    let active = ledger.upsert_active_payment(&request(&booking, "VNPay")).await.unwrap();
    assert_eq!(active.outcome, ActivePaymentOutcome::Created);
    assert_eq!(active.payment.status, PaymentStatus::Pending);
    assert_eq!(active.payment.amount, 30000);
    assert_eq!(active.payment.method, "VNPay");
    assert_eq!(active.payment.transaction_id, None);

    let booking = ledger.get_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(booking.latest_payment_id, Some(active.payment.id));
}

async fn method_switch_keeps_single_row(ledger: &dyn Ledger) {
    let booking = seed_booking(ledger, 2).await;

    let first = ledger.upsert_active_payment(&request(&booking, "VNPay")).await.unwrap();
    let again = ledger.upsert_active_payment(&request(&booking, "VNPay")).await.unwrap();
    assert_eq!(again.outcome, ActivePaymentOutcome::Reused);
    assert_eq!(again.payment.id, first.payment.id);

    let switched = ledger.upsert_active_payment(&request(&booking, "Stripe")).await.unwrap();
    assert_eq!(switched.outcome, ActivePaymentOutcome::MethodSwitched);
    assert_eq!(switched.payment.id, first.payment.id);
    assert_eq!(switched.payment.method, "Stripe");
    assert_eq!(switched.payment.status, PaymentStatus::Pending);

    let payments = ledger.list_payments_for_booking(booking.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].method, "Stripe");
}

async fn confirm_settles_booking_once(ledger: &dyn Ledger) {
    let booking = seed_booking(ledger, 1).await;
    let active = ledger.upsert_active_payment(&request(&booking, "Stripe")).await.unwrap();

    let confirmed = ledger.confirm_payment(active.payment.id, Some("cs_test_123")).await.unwrap();
    assert!(confirmed.newly_confirmed);
    assert_eq!(confirmed.payment.status, PaymentStatus::Success);
    assert_eq!(confirmed.payment.transaction_id.as_deref(), Some("cs_test_123"));
    assert_eq!(confirmed.booking.payment_status, BookingPaymentStatus::Paid);
    assert_eq!(confirmed.booking.status, BookingStatus::Confirmed);
    assert_eq!(confirmed.booking.latest_payment_id, Some(active.payment.id));

    // Second confirmation is a no-op, even with another transaction id
    let again = ledger.confirm_payment(active.payment.id, Some("cs_other")).await.unwrap();
    assert!(!again.newly_confirmed);
    assert_eq!(again.payment.transaction_id.as_deref(), Some("cs_test_123"));
    assert_eq!(again.booking.payment_status, BookingPaymentStatus::Paid);

    let found = ledger.find_payment_by_transaction_id("cs_test_123").await.unwrap().unwrap();
    assert_eq!(found.id, active.payment.id);
}

async fn confirm_without_transaction_id_keeps_existing(ledger: &dyn Ledger) {
    let booking = seed_booking(ledger, 1).await;
    let active = ledger.upsert_active_payment(&request(&booking, "VNPay")).await.unwrap();

    let confirmed = ledger.confirm_payment(active.payment.id, None).await.unwrap();
    assert!(confirmed.newly_confirmed);
    assert_eq!(confirmed.payment.transaction_id, None);
}

async fn successful_payment_is_reused_on_same_method(ledger: &dyn Ledger) {
    let booking = seed_booking(ledger, 1).await;
    let active = ledger.upsert_active_payment(&request(&booking, "VNPay")).await.unwrap();
    ledger.confirm_payment(active.payment.id, None).await.unwrap();

    let again = ledger.upsert_active_payment(&request(&booking, "VNPay")).await.unwrap();
    assert_eq!(again.outcome, ActivePaymentOutcome::Reused);
    assert_eq!(again.payment.status, PaymentStatus::Success);
}

async fn missing_records_are_reported(ledger: &dyn Ledger) {
    let missing = ActivePaymentRequest {
        booking_id: Uuid::new_v4(),
        method: "VNPay".to_string(),
        amount: 100,
    };
    assert!(matches!(ledger.upsert_active_payment(&missing).await, Err(DbError::NotFound)));
    assert!(matches!(ledger.confirm_payment(Uuid::new_v4(), None).await, Err(DbError::NotFound)));
    assert!(ledger.mark_payment_succeeded(Uuid::new_v4(), None).await.unwrap().is_none());
    assert!(ledger.settle_booking(Uuid::new_v4()).await.unwrap().is_none());
    assert!(ledger.get_payment(Uuid::new_v4()).await.unwrap().is_none());
    assert!(ledger.latest_payment_for_booking(Uuid::new_v4()).await.unwrap().is_none());
}

async fn partial_transitions_touch_one_record(ledger: &dyn Ledger) {
    let booking = seed_booking(ledger, 1).await;
    let active = ledger.upsert_active_payment(&request(&booking, "Stripe")).await.unwrap();

    let payment = ledger.mark_payment_succeeded(active.payment.id, Some("cs_webhook")).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.transaction_id.as_deref(), Some("cs_webhook"));
    let untouched = ledger.get_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(untouched.payment_status, BookingPaymentStatus::Unpaid);

    let other = seed_booking(ledger, 1).await;
    let other_payment = ledger.upsert_active_payment(&request(&other, "VNPay")).await.unwrap();
    let settled = ledger.settle_booking(other.id).await.unwrap().unwrap();
    assert_eq!(settled.payment_status, BookingPaymentStatus::Paid);
    assert_eq!(settled.status, BookingStatus::Confirmed);
    let still_pending = ledger.get_payment(other_payment.payment.id).await.unwrap().unwrap();
    assert_eq!(still_pending.status, PaymentStatus::Pending);
}

async fn concurrent_checkouts_share_one_payment(ledger: Arc<dyn Ledger>) {
    let booking = seed_booking(ledger.as_ref(), 2).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = ledger.clone();
        let req = request(&booking, "VNPay");
        handles.push(tokio::spawn(async move { ledger.upsert_active_payment(&req).await }));
    }

    let mut created = 0;
    let mut ids = Vec::new();
    for handle in handles {
        let active = handle.await.unwrap().unwrap();
        if active.outcome == ActivePaymentOutcome::Created {
            created += 1;
        }
        ids.push(active.payment.id);
    }

    assert_eq!(created, 1);
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(ledger.list_payments_for_booking(booking.id).await.unwrap().len(), 1);
}

mod in_memory {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_first_checkout_creates_pending_payment() {
        first_checkout_creates_pending_payment(&InMemoryLedger::new()).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_method_switch_keeps_single_row() {
        method_switch_keeps_single_row(&InMemoryLedger::new()).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_confirm_settles_booking_once() {
        confirm_settles_booking_once(&InMemoryLedger::new()).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_confirm_without_transaction_id_keeps_existing() {
        confirm_without_transaction_id_keeps_existing(&InMemoryLedger::new()).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_successful_payment_is_reused_on_same_method() {
        successful_payment_is_reused_on_same_method(&InMemoryLedger::new()).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_records_are_reported() {
        missing_records_are_reported(&InMemoryLedger::new()).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_partial_transitions_touch_one_record() {
        partial_transitions_touch_one_record(&InMemoryLedger::new()).await;
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn test_concurrent_checkouts_share_one_payment() {
        concurrent_checkouts_share_one_payment(Arc::new(InMemoryLedger::new())).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_booking_for_unknown_tour_is_rejected() {
        let ledger = InMemoryLedger::new();
        let result = ledger
            .create_booking(&BookingCreateDBRequest {
                user_id: Uuid::new_v4(),
                tour_id: Uuid::new_v4(),
                passengers: vec![],
                total: Decimal::ZERO,
                base_price: Decimal::ZERO,
                discount: Decimal::ZERO,
                applied_voucher: None,
            })
            .await;
        assert!(matches!(result, Err(DbError::ForeignKeyViolation { .. })));
    }
}

mod postgres {
    use super::*;

    #[sqlx::test]
    #[test_log::test]
    async fn test_first_checkout_creates_pending_payment(pool: PgPool) {
        first_checkout_creates_pending_payment(&PostgresLedger::new(pool)).await;
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_method_switch_keeps_single_row(pool: PgPool) {
        method_switch_keeps_single_row(&PostgresLedger::new(pool)).await;
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_confirm_settles_booking_once(pool: PgPool) {
        confirm_settles_booking_once(&PostgresLedger::new(pool)).await;
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_confirm_without_transaction_id_keeps_existing(pool: PgPool) {
        confirm_without_transaction_id_keeps_existing(&PostgresLedger::new(pool)).await;
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_successful_payment_is_reused_on_same_method(pool: PgPool) {
        successful_payment_is_reused_on_same_method(&PostgresLedger::new(pool)).await;
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_records_are_reported(pool: PgPool) {
        missing_records_are_reported(&PostgresLedger::new(pool)).await;
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_partial_transitions_touch_one_record(pool: PgPool) {
        partial_transitions_touch_one_record(&PostgresLedger::new(pool)).await;
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_checkouts_share_one_payment(pool: PgPool) {
        concurrent_checkouts_share_one_payment(Arc::new(PostgresLedger::new(pool))).await;
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_paid_booking_cannot_be_left_pending(pool: PgPool) {
        let ledger = PostgresLedger::new(pool.clone());
        let booking = seed_booking(&ledger, 1).await;

        let result = sqlx::query("UPDATE bookings SET payment_status = 'paid' WHERE id = $1")
            .bind(booking.id)
            .execute(&pool)
            .await;
        let err = DbError::from(result.unwrap_err());
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }
}
