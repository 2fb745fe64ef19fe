//! PostgreSQL ledger implementation.
//!
//! Read-then-write operations open a transaction and lock the booking row with
//! `SELECT ... FOR UPDATE` before looking at its payments, so concurrent checkouts and
//! confirmations for one booking are serialized. The partial unique index
//! `payments_one_active_per_booking` backs the one-active-payment rule at the schema level.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool, types::Json};
use tracing::instrument;
use uuid::Uuid;

use super::Ledger;
use crate::db::errors::{DbError, Result};
use crate::db::models::{
    bookings::{AppliedVoucher, BookingCreateDBRequest, BookingDBResponse, BookingPaymentStatus, BookingStatus, Passenger},
    payments::{ActivePayment, ActivePaymentOutcome, ActivePaymentRequest, PaymentConfirmation, PaymentDBResponse, PaymentStatus},
    tours::{TourCreateDBRequest, TourDBResponse},
};
use crate::types::{BookingId, PaymentId, TourId, abbrev_uuid};

const PAYMENT_COLUMNS: &str = "id, booking_id, method, amount, status, transaction_id, created_at, updated_at";

const BOOKING_COLUMNS: &str = "id, user_id, tour_id, passengers, status, payment_status, total, base_price, discount, \
     applied_voucher, latest_payment_id, is_deleted, created_at, updated_at";

#[derive(Debug, FromRow)]
struct Tour {
    id: Uuid,
    title: String,
    price: Decimal,
    created_at: DateTime<Utc>,
}

impl From<Tour> for TourDBResponse {
    fn from(tour: Tour) -> Self {
        Self {
            id: tour.id,
            title: tour.title,
            price: tour.price,
            created_at: tour.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct Booking {
    id: Uuid,
    user_id: Uuid,
    tour_id: Uuid,
    passengers: Json<Vec<Passenger>>,
    status: BookingStatus,
    payment_status: BookingPaymentStatus,
    total: Decimal,
    base_price: Decimal,
    discount: Decimal,
    applied_voucher: Option<Json<AppliedVoucher>>,
    latest_payment_id: Option<Uuid>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingDBResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            user_id: booking.user_id,
            tour_id: booking.tour_id,
            passengers: booking.passengers.0,
            status: booking.status,
            payment_status: booking.payment_status,
            total: booking.total,
            base_price: booking.base_price,
            discount: booking.discount,
            applied_voucher: booking.applied_voucher.map(|v| v.0),
            latest_payment_id: booking.latest_payment_id,
            is_deleted: booking.is_deleted,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct Payment {
    id: Uuid,
    booking_id: Uuid,
    method: String,
    amount: i64,
    status: PaymentStatus,
    transaction_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentDBResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            booking_id: payment.booking_id,
            method: payment.method,
            amount: payment.amount,
            status: payment.status,
            transaction_id: payment.transaction_id,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

/// PostgreSQL implementation of the [`Ledger`] trait.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_booking(conn: &mut PgConnection, booking_id: BookingId) -> Result<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE");
        Ok(sqlx::query_as::<_, Booking>(&sql).bind(booking_id).fetch_optional(conn).await?)
    }

    async fn settle(conn: &mut PgConnection, booking_id: BookingId, latest_payment_id: Option<PaymentId>) -> Result<Option<Booking>> {
        let sql = format!(
            "UPDATE bookings \
             SET payment_status = 'paid', status = 'confirmed', \
                 latest_payment_id = COALESCE($2, latest_payment_id), updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {BOOKING_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Booking>(&sql)
            .bind(booking_id)
            .bind(latest_payment_id)
            .fetch_optional(conn)
            .await?)
    }
}

#[async_trait]
impl Ledger for PostgresLedger {
    #[instrument(skip(self, request), err)]
    async fn create_tour(&self, request: &TourCreateDBRequest) -> Result<TourDBResponse> {
        let tour = sqlx::query_as::<_, Tour>(
            "INSERT INTO tours (id, title, price) VALUES ($1, $2, $3) RETURNING id, title, price, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&request.title)
        .bind(request.price)
        .fetch_one(&self.pool)
        .await?;

        Ok(tour.into())
    }

    async fn get_tour(&self, id: TourId) -> Result<Option<TourDBResponse>> {
        let tour = sqlx::query_as::<_, Tour>("SELECT id, title, price, created_at FROM tours WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tour.map(Into::into))
    }

    #[instrument(skip(self, request), fields(tour_id = %request.tour_id), err)]
    async fn create_booking(&self, request: &BookingCreateDBRequest) -> Result<BookingDBResponse> {
        let sql = format!(
            "INSERT INTO bookings (id, user_id, tour_id, passengers, total, base_price, discount, applied_voucher) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {BOOKING_COLUMNS}"
        );
        let booking = sqlx::query_as::<_, Booking>(&sql)
            .bind(Uuid::new_v4())
            .bind(request.user_id)
            .bind(request.tour_id)
            .bind(Json(&request.passengers))
            .bind(request.total)
            .bind(request.base_price)
            .bind(request.discount)
            .bind(request.applied_voucher.as_ref().map(Json))
            .fetch_one(&self.pool)
            .await?;

        Ok(booking.into())
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<BookingDBResponse>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let booking = sqlx::query_as::<_, Booking>(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(booking.map(Into::into))
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<PaymentDBResponse>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");
        let payment = sqlx::query_as::<_, Payment>(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(payment.map(Into::into))
    }

    async fn find_payment_by_transaction_id(&self, transaction_id: &str) -> Result<Option<PaymentDBResponse>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1 ORDER BY created_at DESC LIMIT 1"
        );
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payment.map(Into::into))
    }

    async fn latest_payment_for_booking(&self, booking_id: BookingId) -> Result<Option<PaymentDBResponse>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE booking_id = $1 ORDER BY created_at DESC LIMIT 1");
        let payment = sqlx::query_as::<_, Payment>(&sql).bind(booking_id).fetch_optional(&self.pool).await?;
        Ok(payment.map(Into::into))
    }

    async fn list_payments_for_booking(&self, booking_id: BookingId) -> Result<Vec<PaymentDBResponse>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE booking_id = $1 ORDER BY created_at DESC");
        let payments = sqlx::query_as::<_, Payment>(&sql).bind(booking_id).fetch_all(&self.pool).await?;
        Ok(payments.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, request), fields(booking_id = %request.booking_id, method = %request.method), err)]
    async fn upsert_active_payment(&self, request: &ActivePaymentRequest) -> Result<ActivePayment> {
        let mut tx = self.pool.begin().await?;

        if Self::lock_booking(&mut tx, request.booking_id).await?.is_none() {
            return Err(DbError::NotFound);
        }

        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE booking_id = $1 AND status IN ('pending', 'success') \
             ORDER BY created_at DESC LIMIT 1"
        );
        let active = sqlx::query_as::<_, Payment>(&sql)
            .bind(request.booking_id)
            .fetch_optional(&mut *tx)
            .await?;

        let result = match active {
            Some(payment) if payment.method == request.method => ActivePayment {
                payment: payment.into(),
                outcome: ActivePaymentOutcome::Reused,
            },
            Some(payment) => {
                let sql = format!(
                    "UPDATE payments SET method = $2, status = 'pending', updated_at = NOW() \
                     WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
                );
                let payment = sqlx::query_as::<_, Payment>(&sql)
                    .bind(payment.id)
                    .bind(&request.method)
                    .fetch_one(&mut *tx)
                    .await?;
                ActivePayment {
                    payment: payment.into(),
                    outcome: ActivePaymentOutcome::MethodSwitched,
                }
            }
            None => {
                let sql = format!(
                    "INSERT INTO payments (id, booking_id, method, amount, status) \
                     VALUES ($1, $2, $3, $4, 'pending') \
                     RETURNING {PAYMENT_COLUMNS}"
                );
                let payment = sqlx::query_as::<_, Payment>(&sql)
                    .bind(Uuid::new_v4())
                    .bind(request.booking_id)
                    .bind(&request.method)
                    .bind(request.amount)
                    .fetch_one(&mut *tx)
                    .await?;

                sqlx::query("UPDATE bookings SET latest_payment_id = $2, updated_at = NOW() WHERE id = $1")
                    .bind(request.booking_id)
                    .bind(payment.id)
                    .execute(&mut *tx)
                    .await?;

                ActivePayment {
                    payment: payment.into(),
                    outcome: ActivePaymentOutcome::Created,
                }
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    #[instrument(skip(self, payment_id), fields(payment_id = %abbrev_uuid(&payment_id)), err)]
    async fn confirm_payment(&self, payment_id: PaymentId, transaction_id: Option<&str>) -> Result<PaymentConfirmation> {
        let mut tx = self.pool.begin().await?;

        // Lock order is booking then payment, same as upsert_active_payment
        let (booking_id,): (Uuid,) = sqlx::query_as("SELECT booking_id FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;

        let booking = Self::lock_booking(&mut tx, booking_id).await?.ok_or(DbError::NotFound)?;

        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE");
        let current = sqlx::query_as::<_, Payment>(&sql).bind(payment_id).fetch_one(&mut *tx).await?;

        if current.status == PaymentStatus::Success {
            tx.rollback().await?;
            return Ok(PaymentConfirmation {
                payment: current.into(),
                booking: booking.into(),
                newly_confirmed: false,
            });
        }

        let sql = format!(
            "UPDATE payments \
             SET status = 'success', transaction_id = COALESCE($2, transaction_id), updated_at = NOW() \
             WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
        );
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(payment_id)
            .bind(transaction_id)
            .fetch_one(&mut *tx)
            .await?;

        let booking = Self::settle(&mut tx, booking_id, Some(payment_id)).await?.ok_or(DbError::NotFound)?;

        tx.commit().await?;

        Ok(PaymentConfirmation {
            payment: payment.into(),
            booking: booking.into(),
            newly_confirmed: true,
        })
    }

    #[instrument(skip(self, payment_id), fields(payment_id = %abbrev_uuid(&payment_id)), err)]
    async fn mark_payment_succeeded(&self, payment_id: PaymentId, transaction_id: Option<&str>) -> Result<Option<PaymentDBResponse>> {
        let sql = format!(
            "UPDATE payments SET status = 'success', transaction_id = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
        );
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(payment_id)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payment.map(Into::into))
    }

    #[instrument(skip(self, booking_id), fields(booking_id = %abbrev_uuid(&booking_id)), err)]
    async fn settle_booking(&self, booking_id: BookingId) -> Result<Option<BookingDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Self::settle(&mut conn, booking_id, None).await?.map(Into::into))
    }
}
