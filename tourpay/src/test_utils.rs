//! Test utilities: configuration, seeded ledgers, session tokens and a test server.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, header};
use axum_test::TestServer;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use sha2::Sha256;
use url::Url;
use uuid::Uuid;

use crate::{
    AppState,
    api::models::users::{CurrentUser, Role},
    auth::session,
    config::{Config, StripeConfig, VnpayConfig},
    db::{
        ledger::{InMemoryLedger, Ledger},
        models::{
            bookings::{BookingCreateDBRequest, BookingDBResponse, Passenger, PassengerType},
            tours::{TourCreateDBRequest, TourDBResponse},
        },
    },
    payment_providers::Providers,
    types::{TourId, UserId},
};

pub const VNPAY_TEST_SECRET: &str = "vnpay-test-hash-secret";
pub const STRIPE_WEBHOOK_TEST_SECRET: &str = "whsec_test_secret";

pub fn create_test_config() -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        frontend_url: "https://tours.example.com".to_string(),
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        enable_metrics: false,
        ..Default::default()
    };

    config.payment.vnpay = Some(VnpayConfig {
        tmn_code: "TESTTMN1".to_string(),
        hash_secret: VNPAY_TEST_SECRET.to_string(),
        url: Url::parse("https://sandbox.vnpayment.vn/paymentv2/vpcpay.html").unwrap(),
        return_url: "https://tours.example.com/payment/vnpay-return".to_string(),
        locale: "vn".to_string(),
        utc_offset_minutes: 420,
    });
    config.payment.stripe = Some(StripeConfig {
        api_key: "sk_test_123".to_string(),
        webhook_secret: STRIPE_WEBHOOK_TEST_SECRET.to_string(),
        api_base: Url::parse("http://127.0.0.1:9").unwrap(),
        currency: "usd".to_string(),
    });

    config
}

fn state_from(config: Config, ledger: Arc<dyn Ledger>) -> AppState {
    let providers = Providers::from_config(&config.payment, &config.frontend_url).expect("Failed to build test providers");
    AppState::builder().config(config).ledger(ledger).providers(Arc::new(providers)).build()
}

/// App state over a fresh in-memory ledger
pub fn create_test_state() -> AppState {
    state_from(create_test_config(), Arc::new(InMemoryLedger::new()))
}

pub struct TestApp {
    pub server: TestServer,
    pub ledger: Arc<dyn Ledger>,
    /// Same store as `ledger`, for test-only mutations
    pub in_memory: InMemoryLedger,
    pub config: Config,
}

/// Full router over an in-memory ledger, with the Stripe API pointed at `stripe_api_base`
pub fn create_test_app(stripe_api_base: &str) -> TestApp {
    let mut config = create_test_config();
    if let Some(stripe) = config.payment.stripe.as_mut() {
        stripe.api_base = Url::parse(stripe_api_base).expect("Invalid Stripe mock URL");
    }

    let in_memory = InMemoryLedger::new();
    let ledger: Arc<dyn Ledger> = Arc::new(in_memory.clone());
    let state = state_from(config.clone(), ledger.clone());
    let router = crate::build_router(state).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to create test server");

    TestApp {
        server,
        ledger,
        in_memory,
        config,
    }
}

pub fn test_user() -> CurrentUser {
    let id = Uuid::new_v4();
    CurrentUser {
        id,
        email: format!("user-{}@example.com", crate::types::abbrev_uuid(&id)),
        role: Role::User,
    }
}

/// `Authorization: Bearer` header for a user, signed with the test secret
pub fn auth_header(user: &CurrentUser) -> (HeaderName, HeaderValue) {
    let token = session::create_session_token(user, &create_test_config()).expect("Failed to create session token");
    let value = HeaderValue::from_str(&format!("Bearer {token}")).expect("Invalid header value");
    (header::AUTHORIZATION, value)
}

pub async fn seed_tour(ledger: &dyn Ledger, price: Decimal) -> TourDBResponse {
    ledger
        .create_tour(&TourCreateDBRequest {
            title: "Mekong Delta Discovery".to_string(),
            price,
        })
        .await
        .expect("Failed to create test tour")
}

pub async fn seed_booking(ledger: &dyn Ledger, user_id: UserId, tour_id: TourId, passengers: usize) -> BookingDBResponse {
    let passengers: Vec<Passenger> = (0..passengers)
        .map(|i| Passenger {
            name: format!("Traveller {i}"),
            age: 30,
            passenger_type: PassengerType::Adult,
        })
        .collect();

    ledger
        .create_booking(&BookingCreateDBRequest {
            user_id,
            tour_id,
            passengers,
            total: Decimal::ZERO,
            base_price: Decimal::ZERO,
            discount: Decimal::ZERO,
            applied_voucher: None,
        })
        .await
        .expect("Failed to create test booking")
}

/// `stripe-signature` header value for a payload, computed the way Stripe signs deliveries
pub fn stripe_signature(secret: &str, timestamp: i64, payload: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

/// A Checkout Session object as the Stripe API returns it, with every non-optional field set
pub fn stripe_checkout_session(id: &str, url: Option<&str>, metadata: Value) -> Value {
    json!({
        "id": id,
        "object": "checkout.session",
        "automatic_tax": { "enabled": false },
        "created": 1_704_067_200,
        "expires_at": 1_704_153_600,
        "custom_fields": [],
        "custom_text": {},
        "livemode": false,
        "mode": "payment",
        "payment_intent": "pi_test_1",
        "payment_method_types": ["card"],
        "payment_status": "paid",
        "shipping_options": [],
        "metadata": metadata,
        "url": url,
    })
}

/// Webhook event envelope around `object`, serialized as Stripe posts it
pub fn stripe_event(event_type: &str, object: Value) -> String {
    json!({
        "id": "evt_test_1",
        "object": "event",
        "api_version": "2023-10-16",
        "created": 1_704_067_200,
        "livemode": false,
        "pending_webhooks": 1,
        "request": null,
        "type": event_type,
        "data": { "object": object },
    })
    .to_string()
}
