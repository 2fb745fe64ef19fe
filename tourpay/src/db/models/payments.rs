//! Database models for payment attempts.

use crate::db::models::bookings::BookingDBResponse;
use crate::types::{BookingId, PaymentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Payment attempt status stored as TEXT in database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    /// Pending and successful attempts count towards the one-active-payment-per-booking rule
    pub fn is_active(self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Success)
    }
}

/// Database response for a payment attempt
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDBResponse {
    pub id: PaymentId,
    pub booking_id: BookingId,
    /// Free-text provider name as requested by the caller ("VNPay", "Stripe", ...)
    pub method: String,
    /// Minor currency units (price x passengers x 100)
    pub amount: i64,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to find or open the active payment attempt of a booking
#[derive(Debug, Clone)]
pub struct ActivePaymentRequest {
    pub booking_id: BookingId,
    pub method: String,
    /// Amount used only when a fresh payment has to be created
    pub amount: i64,
}

/// What `upsert_active_payment` did to reach the returned payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivePaymentOutcome {
    /// No active attempt existed; a new pending payment was created and linked to the booking
    Created,
    /// An active attempt with the same method was returned untouched
    Reused,
    /// An active attempt existed with another method; method updated, status reset to pending
    MethodSwitched,
}

impl ActivePaymentOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivePaymentOutcome::Created => "created",
            ActivePaymentOutcome::Reused => "reused",
            ActivePaymentOutcome::MethodSwitched => "method_switched",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivePayment {
    pub payment: PaymentDBResponse,
    pub outcome: ActivePaymentOutcome,
}

/// Result of confirming a payment together with its booking
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub payment: PaymentDBResponse,
    pub booking: BookingDBResponse,
    /// False when the payment was already successful and nothing was written
    pub newly_confirmed: bool,
}
