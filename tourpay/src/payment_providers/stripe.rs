//! Stripe payment provider implementation
//!
//! Hosted Checkout Sessions are created through `async-stripe`; webhook deliveries are
//! verified with its `Webhook::construct_event` and reduced to a [`WebhookEvent`] carrying
//! only what reconciliation reads.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use stripe::{
    CheckoutSession, CheckoutSessionMode, CheckoutSessionUiMode, Client, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData, Currency, EventObject, EventType,
    StripeError, Webhook, WebhookError,
};

use crate::config::StripeConfig;
use crate::payment_providers::{PaymentError, PaymentMethod, PaymentProvider, RedirectRequest, Result};

/// A verified webhook delivery
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub event_id: String,
    pub event_type: EventType,
    /// Set for `checkout.session.completed` only
    pub completed_session: Option<CompletedSession>,
}

/// The parts of a completed Checkout Session that settle a payment
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletedSession {
    pub session_id: String,
    pub payment_intent: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl From<stripe::Event> for WebhookEvent {
    fn from(event: stripe::Event) -> Self {
        let completed_session = match (event.type_, event.data.object) {
            (EventType::CheckoutSessionCompleted, EventObject::CheckoutSession(session)) => Some(CompletedSession {
                session_id: session.id.to_string(),
                payment_intent: session.payment_intent.as_ref().map(|intent| intent.id().to_string()),
                metadata: session.metadata.unwrap_or_default(),
            }),
            _ => None,
        };

        Self {
            event_id: event.id.to_string(),
            event_type: event.type_,
            completed_session,
        }
    }
}

/// Per-passenger price in cents: the ledger amount split across passengers, rounded to
/// whole cents (half away from zero).
pub fn unit_amount_cents(amount: i64, passenger_count: usize) -> Result<i64> {
    if passenger_count == 0 {
        return Err(PaymentError::InvalidData("Booking has no passengers".to_string()));
    }

    let unit_price = (Decimal::from(amount) / Decimal::ONE_HUNDRED / Decimal::from(passenger_count))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    (unit_price * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| PaymentError::InvalidData(format!("Payment amount {amount} is out of range")))
}

fn webhook_error(error: WebhookError) -> PaymentError {
    match error {
        WebhookError::BadParse(e) => PaymentError::InvalidData(format!("Invalid webhook payload: {e}")),
        WebhookError::BadTimestamp(timestamp) => {
            tracing::warn!(event_timestamp = timestamp, "Stripe webhook outside tolerance window");
            PaymentError::InvalidSignature("Timestamp outside the tolerance zone".to_string())
        }
        other => PaymentError::InvalidSignature(other.to_string()),
    }
}

fn provider_error(error: StripeError) -> PaymentError {
    match error {
        StripeError::Stripe(request) => PaymentError::ProviderApi(
            request
                .message
                .unwrap_or_else(|| format!("Stripe returned {}", request.http_status)),
        ),
        other => PaymentError::ProviderApi(other.to_string()),
    }
}

/// Stripe payment provider
pub struct StripeProvider {
    client: Client,
    currency: Currency,
    webhook_secret: String,
    frontend_url: String,
    timeout: Duration,
}

impl StripeProvider {
    pub fn new(config: StripeConfig, frontend_url: &str, timeout: Duration) -> Result<Self> {
        let currency = config
            .currency
            .parse::<Currency>()
            .map_err(|_| PaymentError::InvalidData(format!("Unknown Stripe currency '{}'", config.currency)))?;

        Ok(Self {
            client: Client::from_url(config.api_base.as_str(), config.api_key),
            currency,
            webhook_secret: config.webhook_secret,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Verify a webhook delivery and parse its event.
    ///
    /// # Errors
    /// - `InvalidSignature` if the header is malformed, older than five minutes, or its `v1`
    ///   signature doesn't match
    /// - `InvalidData` if the verified payload is not an event
    pub fn verify_webhook(&self, payload: &str, signature_header: &str) -> Result<WebhookEvent> {
        self.verify_webhook_at(payload, signature_header, chrono::Utc::now().timestamp())
    }

    fn verify_webhook_at(&self, payload: &str, signature_header: &str, now: i64) -> Result<WebhookEvent> {
        let event = Webhook::construct_event_with_timestamp(payload, signature_header, &self.webhook_secret, now)
            .map_err(webhook_error)?;

        tracing::trace!(event_id = %event.id, event_type = %event.type_, "Validated Stripe webhook event");
        Ok(event.into())
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    async fn build_redirect(&self, request: &RedirectRequest<'_>) -> Result<String> {
        let payment = request.payment;
        let booking = request.booking;
        let passenger_count = booking.passenger_count();
        let unit_amount = unit_amount_cents(payment.amount, passenger_count)?;

        let product_name = match request.tour {
            Some(tour) => format!("Tour: {}", tour.title),
            None => format!("Booking {}", booking.id),
        };
        let success_url = format!(
            "{}/bookings/{}/payment-success?paymentId={}&session_id={{CHECKOUT_SESSION_ID}}",
            self.frontend_url, booking.id, payment.id
        );
        let cancel_url = format!("{}/bookings/{}/payment-cancel?paymentId={}", self.frontend_url, booking.id, payment.id);

        let metadata = HashMap::from([
            ("paymentId".to_string(), payment.id.to_string()),
            ("bookingId".to_string(), booking.id.to_string()),
            ("passengerCount".to_string(), passenger_count.to_string()),
        ]);

        let params = CreateCheckoutSession {
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            mode: Some(CheckoutSessionMode::Payment),
            ui_mode: Some(CheckoutSessionUiMode::Hosted),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                quantity: Some(passenger_count as u64),
                price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                    currency: self.currency,
                    unit_amount: Some(unit_amount),
                    product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                        name: product_name,
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            metadata: Some(metadata),
            ..Default::default()
        };

        let session = tokio::time::timeout(self.timeout, CheckoutSession::create(&self.client, params))
            .await
            .map_err(|_| {
                tracing::error!(payment_id = %payment.id, "Timed out creating Stripe checkout session");
                PaymentError::ProviderApi("Timed out waiting for Stripe".to_string())
            })?
            .map_err(|e| {
                tracing::error!(payment_id = %payment.id, booking_id = %booking.id, "Failed to create Stripe checkout session: {:?}", e);
                provider_error(e)
            })?;

        tracing::info!(
            payment_id = %payment.id,
            booking_id = %booking.id,
            session_id = %session.id,
            "Created Stripe checkout session"
        );

        session.url.ok_or_else(|| {
            tracing::error!(session_id = %session.id, "Checkout session missing URL");
            PaymentError::ProviderApi("Checkout session missing URL".to_string())
        })
    }
}
