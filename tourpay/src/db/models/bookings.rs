//! Database models for bookings.

use crate::types::{BookingId, PaymentId, TourId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Booking lifecycle status stored as TEXT in database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// Whether the booking has been paid for, stored as TEXT in database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingPaymentStatus {
    Unpaid,
    Paid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PassengerType {
    Adult,
    Child,
}

/// A traveller on a booking. Stored in the `passengers` JSONB column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Passenger {
    pub name: String,
    pub age: u32,
    #[serde(rename = "type")]
    pub passenger_type: PassengerType,
}

/// Snapshot of the voucher applied when the booking was priced.
///
/// Kept verbatim so later voucher edits don't change what the customer was quoted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppliedVoucher {
    pub code: String,
    pub discount_type: String,
    #[schema(value_type = String)]
    pub discount_value: Decimal,
    #[schema(value_type = String)]
    pub applied_discount: Decimal,
    #[schema(value_type = Option<String>)]
    pub max_discount: Option<Decimal>,
}

/// Database request for creating a booking (used by the booking intake and by tests)
#[derive(Debug, Clone)]
pub struct BookingCreateDBRequest {
    pub user_id: UserId,
    pub tour_id: TourId,
    pub passengers: Vec<Passenger>,
    pub total: Decimal,
    pub base_price: Decimal,
    pub discount: Decimal,
    pub applied_voucher: Option<AppliedVoucher>,
}

/// Database response for a booking
#[derive(Debug, Clone, PartialEq)]
pub struct BookingDBResponse {
    pub id: BookingId,
    pub user_id: UserId,
    pub tour_id: TourId,
    pub passengers: Vec<Passenger>,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub total: Decimal,
    pub base_price: Decimal,
    pub discount: Decimal,
    pub applied_voucher: Option<AppliedVoucher>,
    pub latest_payment_id: Option<PaymentId>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingDBResponse {
    pub fn passenger_count(&self) -> usize {
        self.passengers.len()
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}
