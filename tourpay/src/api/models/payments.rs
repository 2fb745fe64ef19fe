//! API request/response models for checkout, confirmation and gateway callbacks.
//!
//! The frontend speaks camelCase; gateway callback envelopes keep the field names each gateway
//! expects back.

use crate::{
    db::models::payments::{PaymentDBResponse, PaymentStatus},
    payments::confirmation::ConfirmRequest,
    types::{BookingId, PaymentId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Request models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Booking to pay for
    #[schema(value_type = String, format = "uuid")]
    pub booking_id: BookingId,
    /// `VNPay` or `Stripe`, case-sensitive
    pub method: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    /// Payment ID, as returned from checkout
    pub payment_id: Option<String>,
    /// Gateway transaction ID (or the booking ID, when that is all the caller has)
    pub transaction_id: Option<String>,
}

impl From<ConfirmPaymentRequest> for ConfirmRequest {
    fn from(request: ConfirmPaymentRequest) -> Self {
        Self {
            payment_id: request.payment_id,
            transaction_id: request.transaction_id,
        }
    }
}

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PaymentId,
    #[schema(value_type = String, format = "uuid")]
    pub booking_id: BookingId,
    pub method: String,
    /// Minor currency units
    pub amount: i64,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentDBResponse> for PaymentResponse {
    fn from(payment: PaymentDBResponse) -> Self {
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

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub payment: PaymentResponse,
    /// Where to send the customer to pay
    pub pay_url: String,
}

/// Answer to the customer's browser returning from VNPay
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VnpayReturnResponse {
    pub success: bool,
    pub message: String,
}

/// Answer to a VNPay IPN, in the envelope VNPay expects
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct VnpayIpnResponse {
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl VnpayIpnResponse {
    pub const CONFIRMED: &'static str = "00";
    pub const NOT_FOUND: &'static str = "01";
    pub const INVALID_CHECKSUM: &'static str = "97";
    pub const UNKNOWN_ERROR: &'static str = "99";

    pub fn new(rsp_code: &str, message: &str) -> Self {
        Self {
            rsp_code: rsp_code.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StripeWebhookResponse {
    pub received: bool,
}
