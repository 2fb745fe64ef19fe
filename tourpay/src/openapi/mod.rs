//! OpenAPI documentation for the payment API at `/api/*`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;
use crate::db::models::payments::PaymentStatus;

/// Session token as a bearer header or as the session cookie.
struct SessionSecurityAddon;

impl Modify for SessionSecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token issued at login:\n\n```\nAuthorization: Bearer YOUR_SESSION_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("tourpay_session"))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers((url = "/api", description = "Payment API")),
    paths(
        api::handlers::payments::checkout,
        api::handlers::payments::confirm_payment,
        api::handlers::payments::get_payment,
        api::handlers::payments::list_booking_payments,
        api::handlers::webhooks::vnpay_return,
        api::handlers::webhooks::vnpay_ipn,
        api::handlers::webhooks::stripe_webhook,
    ),
    components(schemas(
        api::models::payments::CheckoutRequest,
        api::models::payments::CheckoutResponse,
        api::models::payments::ConfirmPaymentRequest,
        api::models::payments::PaymentResponse,
        api::models::payments::VnpayReturnResponse,
        api::models::payments::VnpayIpnResponse,
        api::models::payments::StripeWebhookResponse,
        PaymentStatus,
    )),
    modifiers(&SessionSecurityAddon),
    tags(
        (name = "payments", description = "Checkout, confirmation and payment lookups"),
        (name = "gateway_callbacks", description = "Endpoints called by VNPay and Stripe"),
    ),
    info(
        title = "tourpay",
        description = "Payment core of the tour-booking platform",
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/payments/checkout",
            "/payments/confirm",
            "/payments/{id}",
            "/bookings/{id}/payments",
            "/payments/vnpay/return",
            "/payments/vnpay/ipn",
            "/payments/stripe/webhook",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("BearerAuth"));
        assert!(schemes.contains_key("CookieAuth"));
    }
}
