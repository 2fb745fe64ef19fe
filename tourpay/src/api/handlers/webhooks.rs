//! HTTP handlers for gateway callbacks: VNPay return/IPN and Stripe webhooks.
//!
//! These endpoints are called by the gateways (or by the customer's browser on a gateway
//! redirect), never with a session, so they authenticate the request by its signature alone.

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use metrics::counter;
use tracing::{error, warn};

use crate::{
    AppState,
    api::models::payments::{StripeWebhookResponse, VnpayIpnResponse, VnpayReturnResponse},
    errors::{Error, Result},
    payment_providers::PaymentError,
    payments::confirmation::{self, StripeOutcome, VnpayOutcome},
};

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

fn record_callback(gateway: &'static str, result: &'static str) {
    counter!("tourpay_gateway_callbacks_total", "gateway" => gateway, "result" => result).increment(1);
}

fn vnpay_return_body(status: StatusCode, success: bool, message: &str) -> (StatusCode, Json<VnpayReturnResponse>) {
    (
        status,
        Json(VnpayReturnResponse {
            success,
            message: message.to_string(),
        }),
    )
}

/// Customer's browser returning from the VNPay payment page.
#[utoipa::path(
    get,
    path = "/payments/vnpay/return",
    tag = "gateway_callbacks",
    summary = "VNPay return",
    description = "Verify the signed query VNPay appends to the return URL and settle the booking when \
    `vnp_ResponseCode` is `00`.",
    params(
        ("vnp_TxnRef" = String, Query, description = "Payment ID sent at checkout"),
        ("vnp_ResponseCode" = String, Query, description = "`00` on success"),
        ("vnp_SecureHash" = String, Query, description = "HMAC-SHA512 over the other vnp_* parameters"),
    ),
    responses(
        (status = 200, description = "Checksum valid; `success` reports the payment outcome", body = VnpayReturnResponse),
        (status = 400, description = "Invalid checksum", body = VnpayReturnResponse),
        (status = 404, description = "Booking not found", body = VnpayReturnResponse),
        (status = 501, description = "VNPay not configured"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn vnpay_return(
    State(state): State<AppState>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Result<(StatusCode, Json<VnpayReturnResponse>)> {
    let provider = state.providers.vnpay()?;

    let callback = match provider.verify_callback(&query) {
        Ok(callback) => callback,
        Err(PaymentError::InvalidSignature(reason)) => {
            warn!(%reason, "Rejected VNPay return");
            record_callback("vnpay_return", "invalid_signature");
            return Ok(vnpay_return_body(StatusCode::BAD_REQUEST, false, "Invalid checksum"));
        }
        Err(e) => return Err(e.into()),
    };

    let outcome = confirmation::reconcile_vnpay(state.ledger.as_ref(), &callback, "vnpay_return").await?;

    Ok(match outcome {
        VnpayOutcome::Settled(_) => {
            record_callback("vnpay_return", "accepted");
            vnpay_return_body(StatusCode::OK, true, "Payment successful")
        }
        VnpayOutcome::Declined { .. } => {
            record_callback("vnpay_return", "accepted");
            vnpay_return_body(StatusCode::OK, false, "Payment failed")
        }
        VnpayOutcome::BookingNotFound => {
            record_callback("vnpay_return", "not_found");
            vnpay_return_body(StatusCode::NOT_FOUND, false, "Booking not found")
        }
    })
}

/// VNPay server-to-server payment notification.
///
/// Always answers 200 with the envelope VNPay expects; the code tells VNPay whether to retry.
#[utoipa::path(
    get,
    path = "/payments/vnpay/ipn",
    tag = "gateway_callbacks",
    summary = "VNPay IPN",
    description = "Instant payment notification from VNPay. Answers `97` for a bad checksum, `01` when \
    the booking is unknown, and `00` once the notification has been applied, whatever the payment outcome.",
    params(
        ("vnp_TxnRef" = String, Query, description = "Payment ID sent at checkout"),
        ("vnp_ResponseCode" = String, Query, description = "`00` on success"),
        ("vnp_SecureHash" = String, Query, description = "HMAC-SHA512 over the other vnp_* parameters"),
    ),
    responses(
        (status = 200, description = "VNPay acknowledgement envelope", body = VnpayIpnResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn vnpay_ipn(State(state): State<AppState>, Query(query): Query<BTreeMap<String, String>>) -> Json<VnpayIpnResponse> {
    let provider = match state.providers.vnpay() {
        Ok(provider) => provider,
        Err(e) => {
            error!("VNPay IPN received but VNPay is not configured: {e}");
            record_callback("vnpay_ipn", "error");
            return Json(VnpayIpnResponse::new(VnpayIpnResponse::UNKNOWN_ERROR, "Unknown error"));
        }
    };

    let callback = match provider.verify_callback(&query) {
        Ok(callback) => callback,
        Err(PaymentError::InvalidSignature(reason)) => {
            warn!(%reason, "Rejected VNPay IPN");
            record_callback("vnpay_ipn", "invalid_signature");
            return Json(VnpayIpnResponse::new(VnpayIpnResponse::INVALID_CHECKSUM, "Invalid checksum"));
        }
        Err(e) => {
            warn!("Malformed VNPay IPN: {e}");
            record_callback("vnpay_ipn", "error");
            return Json(VnpayIpnResponse::new(VnpayIpnResponse::UNKNOWN_ERROR, "Unknown error"));
        }
    };

    let response = match confirmation::reconcile_vnpay(state.ledger.as_ref(), &callback, "vnpay_ipn").await {
        Ok(VnpayOutcome::BookingNotFound) => {
            record_callback("vnpay_ipn", "not_found");
            VnpayIpnResponse::new(VnpayIpnResponse::NOT_FOUND, "Order not found")
        }
        Ok(VnpayOutcome::Settled(_) | VnpayOutcome::Declined { .. }) => {
            record_callback("vnpay_ipn", "accepted");
            VnpayIpnResponse::new(VnpayIpnResponse::CONFIRMED, "Success")
        }
        Err(e) => {
            error!("Failed to apply VNPay IPN: {e:#}");
            record_callback("vnpay_ipn", "error");
            VnpayIpnResponse::new(VnpayIpnResponse::UNKNOWN_ERROR, "Unknown error")
        }
    };

    Json(response)
}

/// Stripe webhook deliveries.
#[utoipa::path(
    post,
    path = "/payments/stripe/webhook",
    tag = "gateway_callbacks",
    summary = "Stripe webhook",
    description = "Verify the `stripe-signature` header over the raw body. `checkout.session.completed` \
    marks the payment named in the session metadata successful; other events are acknowledged and ignored.",
    request_body(content = String, description = "Raw Stripe event JSON", content_type = "application/json"),
    responses(
        (status = 200, description = "Event received", body = StripeWebhookResponse),
        (status = 400, description = "Missing or invalid signature"),
        (status = 501, description = "Stripe not configured"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn stripe_webhook(State(state): State<AppState>, headers: HeaderMap, body: String) -> Result<Json<StripeWebhookResponse>> {
    let provider = state.providers.stripe()?;

    let Some(signature) = headers.get(STRIPE_SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        record_callback("stripe", "invalid_signature");
        return Err(Error::InvalidSignature {
            reason: "Missing stripe-signature header".to_string(),
        });
    };

    let event = provider.verify_webhook(&body, signature).inspect_err(|e| {
        if matches!(e, PaymentError::InvalidSignature(_)) {
            record_callback("stripe", "invalid_signature");
        }
    })?;

    match confirmation::reconcile_stripe(state.ledger.as_ref(), &event).await? {
        StripeOutcome::PaymentSucceeded(_) | StripeOutcome::Ignored => record_callback("stripe", "accepted"),
        StripeOutcome::UnknownPayment => record_callback("stripe", "not_found"),
    }

    Ok(Json(StripeWebhookResponse { received: true }))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::api::models::payments::VnpayIpnResponse;
    use crate::db::models::{
        bookings::{BookingPaymentStatus, BookingStatus},
        payments::{ActivePaymentRequest, PaymentDBResponse, PaymentStatus},
    };
    use crate::payment_providers::signing;
    use crate::test_utils::{
        STRIPE_WEBHOOK_TEST_SECRET, TestApp, VNPAY_TEST_SECRET, create_test_app, seed_booking, seed_tour, stripe_checkout_session,
        stripe_event, stripe_signature,
    };
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use serde_json::json;
    use uuid::Uuid;

    async fn app_with_payment(method: &str) -> (TestApp, PaymentDBResponse) {
        let app = create_test_app("http://127.0.0.1:9");
        let tour = seed_tour(app.ledger.as_ref(), Decimal::new(50, 0)).await;
        let booking = seed_booking(app.ledger.as_ref(), Uuid::new_v4(), tour.id, 2).await;
        let payment = app
            .ledger
            .upsert_active_payment(&ActivePaymentRequest {
                booking_id: booking.id,
                method: method.to_string(),
                amount: 10000,
            })
            .await
            .unwrap()
            .payment;
        (app, payment)
    }

    /// A VNPay callback query for `txn_ref`, signed with the test secret
    fn signed_vnpay_query(txn_ref: &str, response_code: &str) -> BTreeMap<String, String> {
        let mut query: BTreeMap<String, String> = [
            ("vnp_Amount", "1000000"),
            ("vnp_BankCode", "NCB"),
            ("vnp_OrderInfo", "Thanh toan booking"),
            ("vnp_ResponseCode", response_code),
            ("vnp_TmnCode", "TESTTMN1"),
            ("vnp_TransactionNo", "14012345"),
            ("vnp_TxnRef", txn_ref),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let hash = signing::sign(&query, VNPAY_TEST_SECRET);
        query.insert(signing::SECURE_HASH_TYPE_PARAM.to_string(), "HmacSHA512".to_string());
        query.insert(signing::SECURE_HASH_PARAM.to_string(), hash);
        query
    }

    fn completed_event(payment_id: &str) -> String {
        stripe_event(
            "checkout.session.completed",
            stripe_checkout_session("cs_test_1", None, json!({ "paymentId": payment_id })),
        )
    }

    #[test_log::test(tokio::test)]
    async fn test_vnpay_return_settles_booking() {
        let (app, payment) = app_with_payment("VNPay").await;

        let response = app
            .server
            .get("/api/payments/vnpay/return")
            .add_query_params(signed_vnpay_query(&payment.id.to_string(), "00"))
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({ "success": true, "message": "Payment successful" }));

        let booking = app.ledger.get_booking(payment.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.payment_status, BookingPaymentStatus::Paid);
        assert_eq!(booking.status, BookingStatus::Confirmed);

        // VNPay settles the booking only
        let payment = app.ledger.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[test_log::test(tokio::test)]
    async fn test_vnpay_return_declined() {
        let (app, payment) = app_with_payment("VNPay").await;

        let response = app
            .server
            .get("/api/payments/vnpay/return")
            .add_query_params(signed_vnpay_query(&payment.id.to_string(), "24"))
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({ "success": false, "message": "Payment failed" }));

        let booking = app.ledger.get_booking(payment.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.payment_status, BookingPaymentStatus::Unpaid);
    }

    #[test_log::test(tokio::test)]
    async fn test_vnpay_return_rejects_bad_checksum() {
        let (app, payment) = app_with_payment("VNPay").await;
        let mut query = signed_vnpay_query(&payment.id.to_string(), "00");
        query.insert("vnp_Amount".to_string(), "100".to_string());

        let response = app.server.get("/api/payments/vnpay/return").add_query_params(query).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "success": false, "message": "Invalid checksum" }));
    }

    #[test_log::test(tokio::test)]
    async fn test_vnpay_return_unknown_booking() {
        let (app, _) = app_with_payment("VNPay").await;

        let response = app
            .server
            .get("/api/payments/vnpay/return")
            .add_query_params(signed_vnpay_query(&Uuid::new_v4().to_string(), "00"))
            .await;

        response.assert_status_not_found();
    }

    #[test_log::test(tokio::test)]
    async fn test_vnpay_ipn_tampered_hash_leaves_booking_unchanged() {
        let (app, payment) = app_with_payment("VNPay").await;
        let before = app.ledger.get_booking(payment.booking_id).await.unwrap().unwrap();

        let mut query = signed_vnpay_query(&payment.id.to_string(), "00");
        query.insert(signing::SECURE_HASH_PARAM.to_string(), "0".repeat(128));

        let response = app.server.get("/api/payments/vnpay/ipn").add_query_params(query).await;

        response.assert_status_ok();
        response.assert_json(&json!({ "RspCode": "97", "Message": "Invalid checksum" }));

        let after = app.ledger.get_booking(payment.booking_id).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[test_log::test(tokio::test)]
    async fn test_vnpay_ipn_codes() {
        let (app, payment) = app_with_payment("VNPay").await;

        let unknown: VnpayIpnResponse = app
            .server
            .get("/api/payments/vnpay/ipn")
            .add_query_params(signed_vnpay_query(&Uuid::new_v4().to_string(), "00"))
            .await
            .json();
        assert_eq!(unknown, VnpayIpnResponse::new("01", "Order not found"));

        // A declined payment is still acknowledged
        let declined: VnpayIpnResponse = app
            .server
            .get("/api/payments/vnpay/ipn")
            .add_query_params(signed_vnpay_query(&payment.id.to_string(), "51"))
            .await
            .json();
        assert_eq!(declined, VnpayIpnResponse::new("00", "Success"));
        let booking = app.ledger.get_booking(payment.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.payment_status, BookingPaymentStatus::Unpaid);

        // The booking id works as a transaction reference too
        let settled: VnpayIpnResponse = app
            .server
            .get("/api/payments/vnpay/ipn")
            .add_query_params(signed_vnpay_query(&payment.booking_id.to_string(), "00"))
            .await
            .json();
        assert_eq!(settled, VnpayIpnResponse::new("00", "Success"));
        let booking = app.ledger.get_booking(payment.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.payment_status, BookingPaymentStatus::Paid);
    }

    #[test_log::test(tokio::test)]
    async fn test_stripe_webhook_marks_payment_succeeded() {
        let (app, payment) = app_with_payment("Stripe").await;
        let body = completed_event(&payment.id.to_string());
        let signature = stripe_signature(STRIPE_WEBHOOK_TEST_SECRET, chrono::Utc::now().timestamp(), &body);

        let response = app
            .server
            .post("/api/payments/stripe/webhook")
            .add_header("stripe-signature", signature)
            .text(body)
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({ "received": true }));

        let stored = app.ledger.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Success);
        assert_eq!(stored.transaction_id.as_deref(), Some("pi_test_1"));

        let booking = app.ledger.get_booking(payment.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.payment_status, BookingPaymentStatus::Unpaid);
    }

    #[test_log::test(tokio::test)]
    async fn test_stripe_webhook_rejects_bad_signature() {
        let (app, payment) = app_with_payment("Stripe").await;
        let body = completed_event(&payment.id.to_string());
        let signature = stripe_signature("whsec_someone_else", chrono::Utc::now().timestamp(), &body);

        let response = app
            .server
            .post("/api/payments/stripe/webhook")
            .add_header("stripe-signature", signature)
            .text(body.clone())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let response = app.server.post("/api/payments/stripe/webhook").text(body).await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let stored = app.ledger.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
    }

    #[test_log::test(tokio::test)]
    async fn test_stripe_webhook_ignores_other_events() {
        let (app, payment) = app_with_payment("Stripe").await;
        let body = stripe_event(
            "checkout.session.expired",
            stripe_checkout_session("cs_test_1", None, json!({ "paymentId": payment.id.to_string() })),
        );
        let signature = stripe_signature(STRIPE_WEBHOOK_TEST_SECRET, chrono::Utc::now().timestamp(), &body);

        let response = app
            .server
            .post("/api/payments/stripe/webhook")
            .add_header("stripe-signature", signature)
            .text(body)
            .await;
        response.assert_status_ok();

        let stored = app.ledger.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
    }

    #[test_log::test(tokio::test)]
    async fn test_stripe_webhook_unknown_payment_is_acknowledged() {
        let (app, _) = app_with_payment("Stripe").await;
        let body = completed_event(&Uuid::new_v4().to_string());
        let signature = stripe_signature(STRIPE_WEBHOOK_TEST_SECRET, chrono::Utc::now().timestamp(), &body);

        let response = app
            .server
            .post("/api/payments/stripe/webhook")
            .add_header("stripe-signature", signature)
            .text(body)
            .await;
        response.assert_status_ok();
    }
}
