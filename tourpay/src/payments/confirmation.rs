//! Confirmation reconciliation: manual confirmations and gateway callbacks.
//!
//! Each path settles a different slice of the ledger:
//!
//! | path            | Payment                       | Booking              |
//! |-----------------|-------------------------------|----------------------|
//! | manual confirm  | success + transaction id      | paid + confirmed     |
//! | VNPay return/IPN| untouched                     | paid + confirmed     |
//! | Stripe webhook  | success + payment intent      | untouched            |
//!
//! Only the manual path is idempotent; the Stripe webhook overwrites the transaction id on
//! every delivery.

use metrics::counter;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    api::models::users::CurrentUser,
    db::{
        ledger::Ledger,
        models::{bookings::BookingDBResponse, payments::PaymentDBResponse},
    },
    errors::{Error, Result},
    payment_providers::{stripe::WebhookEvent, vnpay::VnpayCallback},
};

/// Identifiers a manual confirmation may carry
#[derive(Debug, Clone, Default)]
pub struct ConfirmRequest {
    pub payment_id: Option<String>,
    pub transaction_id: Option<String>,
}

/// Ways of finding the payment a confirmation refers to, tried in [`LOOKUP_ORDER`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStrategy {
    /// `paymentId` is the payment's own id
    PaymentId,
    /// `transactionId` is a gateway transaction id recorded earlier
    TransactionId,
    /// `transactionId` is actually a booking id; take that booking's newest payment
    BookingFallback,
}

pub const LOOKUP_ORDER: [LookupStrategy; 3] = [
    LookupStrategy::PaymentId,
    LookupStrategy::TransactionId,
    LookupStrategy::BookingFallback,
];

impl LookupStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            LookupStrategy::PaymentId => "payment_id",
            LookupStrategy::TransactionId => "transaction_id",
            LookupStrategy::BookingFallback => "booking_fallback",
        }
    }

    /// Try this strategy; `None` means fall through to the next one
    async fn resolve(self, ledger: &dyn Ledger, request: &ConfirmRequest) -> Result<Option<PaymentDBResponse>> {
        let parse = |value: &Option<String>| value.as_deref().and_then(|v| Uuid::parse_str(v).ok());

        Ok(match self {
            LookupStrategy::PaymentId => match parse(&request.payment_id) {
                Some(id) => ledger.get_payment(id).await?,
                None => None,
            },
            LookupStrategy::TransactionId => match request.transaction_id.as_deref() {
                Some(transaction_id) => ledger.find_payment_by_transaction_id(transaction_id).await?,
                None => None,
            },
            LookupStrategy::BookingFallback => match parse(&request.transaction_id) {
                Some(booking_id) => ledger.latest_payment_for_booking(booking_id).await?,
                None => None,
            },
        })
    }
}

/// Find the payment a confirmation request refers to, first strategy hit wins
pub async fn lookup_payment(ledger: &dyn Ledger, request: &ConfirmRequest) -> Result<Option<(LookupStrategy, PaymentDBResponse)>> {
    for strategy in LOOKUP_ORDER {
        if let Some(payment) = strategy.resolve(ledger, request).await? {
            return Ok(Some((strategy, payment)));
        }
    }
    Ok(None)
}

/// Confirm a payment on behalf of its owner (the frontend's success page).
///
/// Already successful payments are returned unchanged. Otherwise the payment is marked
/// successful and its booking paid + confirmed in one atomic write.
///
/// # Errors
/// - `NotFound` naming the transaction id if no strategy finds a payment
/// - `NotOwner` if the caller doesn't own the payment's booking
#[instrument(skip_all, fields(user_id = %caller.id, payment_id, booking_id), err)]
pub async fn confirm(ledger: &dyn Ledger, caller: &CurrentUser, request: &ConfirmRequest) -> Result<PaymentDBResponse> {
    let Some((strategy, payment)) = lookup_payment(ledger, request).await? else {
        counter!("tourpay_confirmations_total", "source" => "manual", "outcome" => "not_found").increment(1);
        return Err(Error::NotFound {
            resource: "Payment".to_string(),
            id: request
                .transaction_id
                .clone()
                .or_else(|| request.payment_id.clone())
                .unwrap_or_default(),
        });
    };

    let span = tracing::Span::current();
    span.record("payment_id", tracing::field::display(payment.id));
    span.record("booking_id", tracing::field::display(payment.booking_id));
    debug!(strategy = strategy.as_str(), "Resolved payment for confirmation");

    let booking = ledger
        .get_booking(payment.booking_id)
        .await?
        .filter(|booking| !booking.is_deleted)
        .ok_or_else(|| {
            counter!("tourpay_confirmations_total", "source" => "manual", "outcome" => "not_found").increment(1);
            Error::NotFound {
                resource: "Booking".to_string(),
                id: payment.booking_id.to_string(),
            }
        })?;

    if !booking.is_owned_by(caller.id) {
        counter!("tourpay_confirmations_total", "source" => "manual", "outcome" => "forbidden").increment(1);
        return Err(Error::NotOwner {
            resource: "payment".to_string(),
            id: payment.id.to_string(),
        });
    }

    let confirmation = ledger.confirm_payment(payment.id, request.transaction_id.as_deref()).await?;

    let outcome = if confirmation.newly_confirmed { "confirmed" } else { "already_confirmed" };
    counter!("tourpay_confirmations_total", "source" => "manual", "outcome" => outcome).increment(1);
    info!(
        payment_id = %confirmation.payment.id,
        booking_id = %confirmation.booking.id,
        outcome,
        "Manual confirmation applied"
    );

    Ok(confirmation.payment)
}

/// Result of applying a VNPay return/IPN
#[derive(Debug, Clone, PartialEq)]
pub enum VnpayOutcome {
    /// `vnp_TxnRef` matched neither a payment nor a booking
    BookingNotFound,
    /// Response code `00`: the booking is now paid + confirmed
    Settled(BookingDBResponse),
    /// Any other response code; nothing was written
    Declined { response_code: String },
}

/// Apply a verified VNPay callback to the ledger.
///
/// `vnp_TxnRef` is resolved as a payment id first, then as a booking id. Only the booking is
/// settled; the payment record is left as it was.
#[instrument(skip_all, fields(txn_ref = %callback.txn_ref, response_code = %callback.response_code), err)]
pub async fn reconcile_vnpay(ledger: &dyn Ledger, callback: &VnpayCallback, source: &'static str) -> Result<VnpayOutcome> {
    let booking = match Uuid::parse_str(&callback.txn_ref) {
        Ok(id) => {
            let booking_id = ledger.get_payment(id).await?.map_or(id, |payment| payment.booking_id);
            ledger.get_booking(booking_id).await?.filter(|booking| !booking.is_deleted)
        }
        Err(_) => None,
    };

    let Some(booking_id) = booking.map(|booking| booking.id) else {
        warn!("VNPay callback for unknown or deleted booking");
        counter!("tourpay_confirmations_total", "source" => source, "outcome" => "not_found").increment(1);
        return Ok(VnpayOutcome::BookingNotFound);
    };

    if !callback.is_success() {
        info!(booking_id = %booking_id, "VNPay reported an unsuccessful payment");
        counter!("tourpay_confirmations_total", "source" => source, "outcome" => "declined").increment(1);
        return Ok(VnpayOutcome::Declined {
            response_code: callback.response_code.clone(),
        });
    }

    match ledger.settle_booking(booking_id).await? {
        Some(booking) => {
            info!(
                booking_id = %booking.id,
                transaction_no = callback.transaction_no.as_deref().unwrap_or("-"),
                "Booking settled from VNPay callback"
            );
            counter!("tourpay_confirmations_total", "source" => source, "outcome" => "confirmed").increment(1);
            Ok(VnpayOutcome::Settled(booking))
        }
        None => {
            counter!("tourpay_confirmations_total", "source" => source, "outcome" => "not_found").increment(1);
            Ok(VnpayOutcome::BookingNotFound)
        }
    }
}

/// Result of applying a Stripe webhook event
#[derive(Debug, Clone, PartialEq)]
pub enum StripeOutcome {
    /// Not a `checkout.session.completed` event
    Ignored,
    /// The session metadata names no payment this ledger knows
    UnknownPayment,
    PaymentSucceeded(PaymentDBResponse),
}

/// Apply a verified Stripe event to the ledger.
///
/// On `checkout.session.completed` the payment named in the session metadata is set to
/// success with the session's payment intent as transaction id, unconditionally. The
/// booking is not touched.
#[instrument(skip_all, fields(event_id = %event.event_id, event_type = %event.event_type), err)]
pub async fn reconcile_stripe(ledger: &dyn Ledger, event: &WebhookEvent) -> Result<StripeOutcome> {
    let Some(session) = &event.completed_session else {
        debug!("Ignoring Stripe event");
        return Ok(StripeOutcome::Ignored);
    };

    let payment_id = session.metadata.get("paymentId").and_then(|id| Uuid::parse_str(id).ok());
    let Some(payment_id) = payment_id else {
        warn!(session_id = %session.session_id, "Checkout session without a usable paymentId");
        counter!("tourpay_confirmations_total", "source" => "stripe_webhook", "outcome" => "not_found").increment(1);
        return Ok(StripeOutcome::UnknownPayment);
    };

    match ledger.mark_payment_succeeded(payment_id, session.payment_intent.as_deref()).await? {
        Some(payment) => {
            info!(
                payment_id = %payment.id,
                booking_id = %payment.booking_id,
                session_id = %session.session_id,
                "Payment marked successful from Stripe webhook"
            );
            counter!("tourpay_confirmations_total", "source" => "stripe_webhook", "outcome" => "confirmed").increment(1);
            Ok(StripeOutcome::PaymentSucceeded(payment))
        }
        None => {
            warn!(payment_id = %payment_id, session_id = %session.session_id, "Stripe webhook for unknown payment");
            counter!("tourpay_confirmations_total", "source" => "stripe_webhook", "outcome" => "not_found").increment(1);
            Ok(StripeOutcome::UnknownPayment)
        }
    }
}
