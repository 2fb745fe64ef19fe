//! # tourpay: payment core of the tour-booking platform
//!
//! `tourpay` takes a booking from "priced" to "paid". It opens payment attempts against a
//! booking, sends the customer to a payment gateway (VNPay or Stripe), and reconciles the
//! gateway's answer back onto the booking.
//!
//! ## Overview
//!
//! Bookings and the tour read model are written by the booking intake; accounts and session
//! tokens are issued by the identity service. This crate owns the payment attempts and the
//! two booking fields that record payment (`payment_status`, `status`).
//!
//! ### Request Flow
//!
//! #### Checkout (`POST /api/payments/checkout`)
//!
//! The caller must own the booking. The booking's active payment (pending or successful) is
//! found or created in a single per-booking atomic step, so retries and concurrent requests
//! converge on one payment attempt. The chosen gateway then builds the redirect: a signed
//! VNPay payment URL, or a hosted Stripe Checkout Session.
//!
//! #### Confirmation
//!
//! Three paths settle a payment, each touching a different slice of the ledger (see
//! [`payments::confirmation`]):
//!
//! - `POST /api/payments/confirm`: the frontend's success page, idempotent
//! - `GET /api/payments/vnpay/return` and `/ipn`: checksum-verified VNPay callbacks
//! - `POST /api/payments/stripe/webhook`: signature-verified Stripe events
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum). Persistence goes
//! through the [`db::ledger::Ledger`] trait: PostgreSQL when `database_url` is configured, an
//! in-memory ledger otherwise (development and tests).
//!
//! ## Modules
//!
//! - [`api`]: HTTP handlers and wire models
//! - [`auth`]: session token verification and the `CurrentUser` extractor
//! - [`payments`]: checkout orchestration and confirmation reconciliation
//! - [`payment_providers`]: gateway adapters and the signing codec
//! - [`db`]: ledger trait, implementations and records
//! - [`config`]: configuration loading and validation
//! - [`telemetry`]: tracing and optional OTLP export

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod payment_providers;
pub mod payments;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::{
    Router,
    http::{self, HeaderValue},
    response::Json,
    routing::{get, post},
};
use bon::Builder;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;

use crate::config::CorsOrigin;
use crate::db::ledger::{InMemoryLedger, Ledger, PostgresLedger};
use crate::openapi::ApiDoc;
use crate::payment_providers::Providers;

pub use config::Config;
pub use types::{BookingId, PaymentId, TourId, UserId};

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .ledger(Arc::new(InMemoryLedger::new()))
///     .providers(Arc::new(providers))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub ledger: Arc<dyn Ledger>,
    pub providers: Arc<Providers>,
}

/// Get the tourpay database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder on first use and return its handle.
///
/// Counters recorded through the `metrics` facade before this is called are dropped.
pub fn get_or_install_prometheus_handle() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Connect the ledger: Postgres (migrated) when `database_url` is set, in-memory otherwise.
#[instrument(skip_all)]
async fn setup_ledger(config: &Config) -> anyhow::Result<(Arc<dyn Ledger>, Option<PgPool>)> {
    match &config.database_url {
        Some(url) => {
            info!("Using external database");
            let pool = PgPool::connect(url).await?;
            migrator().run(&pool).await?;
            Ok((Arc::new(PostgresLedger::new(pool.clone())), Some(pool)))
        }
        None => {
            info!("No database_url configured, using the in-memory ledger: data will be lost on shutdown");
            Ok((Arc::new(InMemoryLedger::new()), None))
        }
    }
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.auth.cors.allow_credentials)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.auth.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// - `/api/*`: payment endpoints and gateway callbacks
/// - `/api/openapi.json`: OpenAPI document
/// - `/healthz`: liveness
/// - `/internal/metrics`: Prometheus metrics, when `enable_metrics` is set
///
/// # Errors
///
/// Returns an error if the CORS configuration is invalid or the metrics recorder can't be
/// installed.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    use api::handlers::{payments, webhooks};

    let api_routes = Router::new()
        .route("/payments/checkout", post(payments::checkout))
        .route("/payments/confirm", post(payments::confirm_payment))
        .route("/payments/vnpay/return", get(webhooks::vnpay_return))
        .route("/payments/vnpay/ipn", get(webhooks::vnpay_ipn))
        .route("/payments/stripe/webhook", post(webhooks::stripe_webhook))
        .route("/payments/{id}", get(payments::get_payment))
        .route("/bookings/{id}/payments", get(payments::list_booking_payments))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }));

    let cors_layer = create_cors_layer(&state.config)?;
    let enable_metrics = state.config.enable_metrics;

    let mut router = Router::new()
        .nest("/api", api_routes)
        .route("/healthz", get(|| async { "OK" }))
        .with_state(state)
        .layer(cors_layer);

    if enable_metrics {
        let handle = get_or_install_prometheus_handle()?;
        router = router.route("/internal/metrics", get(move || async move { handle.render() }));
    }

    // Add tracing layer
    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting tourpay with configuration: {:#?}", config);

        let (ledger, pool) = setup_ledger(&config).await?;
        let providers = Providers::from_config(&config.payment, &config.frontend_url)?;

        let app_state = AppState::builder()
            .config(config.clone())
            .ledger(ledger)
            .providers(Arc::new(providers))
            .build();

        let router = build_router(app_state)?;

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("tourpay listening on http://{}", bind_addr);

        // Peer addresses feed the client IP sent to VNPay
        axum::serve(
            listener,
            self.router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
