//! HTTP handlers for the customer-facing payment endpoints.

use axum::{
    extract::{Path, State},
    response::Json,
};

use crate::{
    AppState,
    api::models::{
        payments::{CheckoutRequest, CheckoutResponse, ConfirmPaymentRequest, PaymentResponse},
        users::CurrentUser,
    },
    errors::{Error, Result},
    payment_providers::CheckoutContext,
    payments::{checkout::checkout as run_checkout, confirmation},
    types::{BookingId, PaymentId},
};

/// Start or resume paying for a booking.
#[utoipa::path(
    post,
    path = "/payments/checkout",
    tag = "payments",
    summary = "Checkout",
    description = "Find or open the active payment of a booking and return the gateway URL to pay it. \
    Safe to repeat: a pending attempt is reused, and asking for another method switches it over.",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Payment attempt and gateway redirect", body = CheckoutResponse),
        (status = 400, description = "Unsupported payment method"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - booking belongs to another user"),
        (status = 404, description = "Booking not found"),
        (status = 501, description = "Payment method not configured"),
        (status = 502, description = "Payment gateway rejected the request"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn checkout(
    State(state): State<AppState>,
    current_user: CurrentUser,
    context: CheckoutContext,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let outcome = run_checkout(
        state.ledger.as_ref(),
        &state.providers,
        &current_user,
        request.booking_id,
        &request.method,
        &context,
    )
    .await?;

    Ok(Json(CheckoutResponse {
        payment: outcome.payment.into(),
        pay_url: outcome.pay_url,
    }))
}

/// Confirm a payment after the customer returns from the gateway.
#[utoipa::path(
    post,
    path = "/payments/confirm",
    tag = "payments",
    summary = "Confirm payment",
    description = "Mark a payment successful and its booking paid. Replaying a confirmation returns the \
    payment unchanged. `transactionId` may also be a booking ID, in which case the booking's newest payment is used.",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "The confirmed payment", body = PaymentResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - payment belongs to another user"),
        (status = 404, description = "Payment not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<PaymentResponse>> {
    let payment = confirmation::confirm(state.ledger.as_ref(), &current_user, &request.into()).await?;
    Ok(Json(payment.into()))
}

/// Get a single payment attempt.
#[utoipa::path(
    get,
    path = "/payments/{id}",
    tag = "payments",
    summary = "Get payment",
    params(
        ("id" = String, Path, description = "Payment ID (UUID)"),
    ),
    responses(
        (status = 200, description = "Payment details", body = PaymentResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - payment belongs to another user"),
        (status = 404, description = "Payment not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<PaymentId>,
    current_user: CurrentUser,
) -> Result<Json<PaymentResponse>> {
    let not_found = || Error::NotFound {
        resource: "Payment".to_string(),
        id: id.to_string(),
    };

    let payment = state.ledger.get_payment(id).await?.ok_or_else(not_found)?;
    let booking = state
        .ledger
        .get_booking(payment.booking_id)
        .await?
        .filter(|booking| !booking.is_deleted)
        .ok_or_else(not_found)?;

    if !booking.is_owned_by(current_user.id) {
        return Err(Error::NotOwner {
            resource: "payment".to_string(),
            id: id.to_string(),
        });
    }

    Ok(Json(payment.into()))
}

/// List the payment attempts of a booking.
#[utoipa::path(
    get,
    path = "/bookings/{id}/payments",
    tag = "payments",
    summary = "List booking payments",
    description = "All payment attempts of a booking, newest first.",
    params(
        ("id" = String, Path, description = "Booking ID (UUID)"),
    ),
    responses(
        (status = 200, description = "Payment attempts", body = [PaymentResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - booking belongs to another user"),
        (status = 404, description = "Booking not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_booking_payments(
    State(state): State<AppState>,
    Path(id): Path<BookingId>,
    current_user: CurrentUser,
) -> Result<Json<Vec<PaymentResponse>>> {
    let booking = state
        .ledger
        .get_booking(id)
        .await?
        .filter(|booking| !booking.is_deleted)
        .ok_or_else(|| Error::NotFound {
            resource: "Booking".to_string(),
            id: id.to_string(),
        })?;

    if !booking.is_owned_by(current_user.id) {
        return Err(Error::NotOwner {
            resource: "booking".to_string(),
            id: id.to_string(),
        });
    }

    let payments = state.ledger.list_payments_for_booking(id).await?;
    Ok(Json(payments.into_iter().map(PaymentResponse::from).collect()))
}
