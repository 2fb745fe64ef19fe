//! Payment provider abstraction layer
//!
//! This module defines the `PaymentProvider` trait which abstracts building the redirect a
//! customer follows to pay, across gateways (VNPay, Stripe). Gateway callbacks are
//! provider-specific and live on the concrete types:
//!
//! - [`vnpay::VnpayProvider`]: signed redirect URL, return/IPN checksum verification
//! - [`stripe::StripeProvider`]: hosted Checkout Session, webhook signature verification
//! - [`signing`]: the HMAC codec shared by both

use std::convert::Infallible;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::PaymentsConfig;
use crate::db::models::{bookings::BookingDBResponse, payments::PaymentDBResponse, tours::TourDBResponse};

pub mod signing;
pub mod stripe;
pub mod vnpay;

/// Result type for payment provider operations
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors that can occur during payment processing
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider API error: {0}")]
    ProviderApi(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid payment data: {0}")]
    InvalidData(String),

    #[error("Unsupported payment method: {0}")]
    UnsupportedMethod(String),

    #[error("Payment method {0} is not configured")]
    NotConfigured(PaymentMethod),
}

/// Gateways a checkout can be dispatched to.
///
/// Parsed from the free-text `method` of a payment, exact and case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum PaymentMethod {
    #[serde(rename = "VNPay")]
    VNPay,
    Stripe,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::VNPay => "VNPay",
            PaymentMethod::Stripe => "Stripe",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "VNPay" => Ok(PaymentMethod::VNPay),
            "Stripe" => Ok(PaymentMethod::Stripe),
            other => Err(PaymentError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Network details of the customer starting a checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutContext {
    pub client_ip: String,
}

impl CheckoutContext {
    /// Resolve the customer IP: first `x-forwarded-for` entry, else the peer address, else
    /// loopback.
    pub fn from_request(headers: &HeaderMap, remote: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        let client_ip = match (forwarded, remote) {
            (Some(ip), _) => ip.to_string(),
            (None, Some(addr)) => addr.ip().to_string(),
            (None, None) => IpAddr::from([127, 0, 0, 1]).to_string(),
        };

        Self { client_ip }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CheckoutContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let remote = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| *addr);
        Ok(Self::from_request(&parts.headers, remote))
    }
}

/// Everything an adapter may put on the redirect
#[derive(Debug, Clone, Copy)]
pub struct RedirectRequest<'a> {
    pub payment: &'a PaymentDBResponse,
    pub booking: &'a BookingDBResponse,
    /// `None` when the tour is no longer in the read model
    pub tour: Option<&'a TourDBResponse>,
    pub context: &'a CheckoutContext,
}

/// Abstract payment provider interface
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Build the URL the customer should be redirected to for payment.
    ///
    /// May call out to the gateway (Stripe creates a session); never touches the ledger.
    async fn build_redirect(&self, request: &RedirectRequest<'_>) -> Result<String>;
}

/// The configured gateways.
///
/// This is the single point where we convert config into provider instances.
/// Adding a new provider requires a field here and a match arm in [`Providers::get`].
#[derive(Default)]
pub struct Providers {
    vnpay: Option<vnpay::VnpayProvider>,
    stripe: Option<stripe::StripeProvider>,
}

impl Providers {
    pub fn from_config(config: &PaymentsConfig, frontend_url: &str) -> Result<Self> {
        let vnpay = config.vnpay.clone().map(vnpay::VnpayProvider::new).transpose()?;
        let stripe = config
            .stripe
            .clone()
            .map(|stripe_config| stripe::StripeProvider::new(stripe_config, frontend_url, config.http_timeout))
            .transpose()?;

        tracing::info!(
            vnpay = vnpay.is_some(),
            stripe = stripe.is_some(),
            "Configured payment providers"
        );

        Ok(Self { vnpay, stripe })
    }

    pub fn get(&self, method: PaymentMethod) -> Result<&dyn PaymentProvider> {
        let provider: Option<&dyn PaymentProvider> = match method {
            PaymentMethod::VNPay => self.vnpay.as_ref().map(|p| p as &dyn PaymentProvider),
            PaymentMethod::Stripe => self.stripe.as_ref().map(|p| p as &dyn PaymentProvider),
        };
        provider.ok_or(PaymentError::NotConfigured(method))
    }

    pub fn vnpay(&self) -> Result<&vnpay::VnpayProvider> {
        self.vnpay.as_ref().ok_or(PaymentError::NotConfigured(PaymentMethod::VNPay))
    }

    pub fn stripe(&self) -> Result<&stripe::StripeProvider> {
        self.stripe.as_ref().ok_or(PaymentError::NotConfigured(PaymentMethod::Stripe))
    }
}
