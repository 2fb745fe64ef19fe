//! Checkout orchestration: booking → active payment → gateway redirect.

use metrics::counter;
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use tracing::{info, instrument};

use crate::{
    api::models::users::CurrentUser,
    db::{
        ledger::Ledger,
        models::payments::{ActivePaymentRequest, PaymentDBResponse},
    },
    errors::{Error, Result},
    payment_providers::{self, CheckoutContext, PaymentMethod, Providers, RedirectRequest},
    types::BookingId,
};

/// A payment attempt and where to send the customer to complete it
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub payment: PaymentDBResponse,
    pub pay_url: String,
}

/// Ledger amount of a booking in minor units: `price × passengers × 100`, rounded half away
/// from zero.
pub fn payment_amount(price: Decimal, passenger_count: usize) -> Result<i64> {
    (price * Decimal::from(passenger_count) * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| Error::BadRequest {
            message: format!("Booking amount {price} x {passenger_count} is out of range"),
        })
}

async fn build_redirect(providers: &Providers, method: &str, request: &RedirectRequest<'_>) -> payment_providers::Result<String> {
    let method: PaymentMethod = method.parse()?;
    providers.get(method)?.build_redirect(request).await
}

/// Start or resume payment of a booking with the given method.
///
/// The active payment is found or created before the method is validated, so a request
/// with an unknown method still switches an existing attempt over to it before failing.
/// The booking's own status is never changed here.
///
/// # Errors
/// - `NotFound` if the booking doesn't exist (or is deleted), or its tour is gone and there is
///   no attempt to resume
/// - `NotOwner` if the caller doesn't own the booking, whatever their role
/// - `UnsupportedMethod` for anything but exactly `VNPay` or `Stripe`
/// - `NotImplemented` if the gateway isn't configured
/// - `Provider` if the gateway rejects the request
#[instrument(skip_all, fields(booking_id = %booking_id, method = %method, user_id = %caller.id), err)]
pub async fn checkout(
    ledger: &dyn Ledger,
    providers: &Providers,
    caller: &CurrentUser,
    booking_id: BookingId,
    method: &str,
    context: &CheckoutContext,
) -> Result<CheckoutOutcome> {
    let booking = ledger
        .get_booking(booking_id)
        .await?
        .filter(|booking| !booking.is_deleted)
        .ok_or_else(|| Error::NotFound {
            resource: "Booking".to_string(),
            id: booking_id.to_string(),
        })?;

    if !booking.is_owned_by(caller.id) {
        return Err(Error::NotOwner {
            resource: "booking".to_string(),
            id: booking_id.to_string(),
        });
    }

    let tour = ledger.get_tour(booking.tour_id).await?;

    // The amount only matters when a new attempt is created
    let amount = match &tour {
        Some(tour) => payment_amount(tour.price, booking.passenger_count())?,
        None => match ledger.latest_payment_for_booking(booking.id).await? {
            Some(payment) if payment.status.is_active() => payment.amount,
            _ => {
                return Err(Error::NotFound {
                    resource: "Tour".to_string(),
                    id: booking.tour_id.to_string(),
                });
            }
        },
    };

    let active = ledger
        .upsert_active_payment(&ActivePaymentRequest {
            booking_id: booking.id,
            method: method.to_string(),
            amount,
        })
        .await?;

    info!(
        payment_id = %active.payment.id,
        booking_id = %booking.id,
        amount = active.payment.amount,
        outcome = active.outcome.as_str(),
        "Active payment resolved"
    );

    let request = RedirectRequest {
        payment: &active.payment,
        booking: &booking,
        tour: tour.as_ref(),
        context,
    };
    let result = build_redirect(providers, method, &request).await;

    let method_label = method.parse::<PaymentMethod>().map(PaymentMethod::as_str).unwrap_or("unsupported");
    match result {
        Ok(pay_url) => {
            counter!("tourpay_checkouts_total", "method" => method_label, "outcome" => active.outcome.as_str()).increment(1);
            Ok(CheckoutOutcome {
                payment: active.payment,
                pay_url,
            })
        }
        Err(e) => {
            counter!("tourpay_checkouts_total", "method" => method_label, "outcome" => "failed").increment(1);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::db::ledger::InMemoryLedger;
    use crate::db::models::payments::PaymentStatus;
    use crate::test_utils::{seed_booking, seed_tour};
    use uuid::Uuid;

    fn caller(id: Uuid, role: Role) -> CurrentUser {
        CurrentUser {
            id,
            email: "traveller@example.com".to_string(),
            role,
        }
    }

    fn context() -> CheckoutContext {
        CheckoutContext {
            client_ip: "127.0.0.1".to_string(),
        }
    }

    #[test]
    fn test_payment_amount() {
        assert_eq!(payment_amount(Decimal::new(10000, 2), 3).unwrap(), 30000);
        assert_eq!(payment_amount(Decimal::new(50, 0), 2).unwrap(), 10000);
        // 19.995 x 1 -> 1999.5 -> 2000
        assert_eq!(payment_amount(Decimal::new(19995, 3), 1).unwrap(), 2000);
        assert_eq!(payment_amount(Decimal::new(50, 0), 0).unwrap(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_booking() {
        let ledger = InMemoryLedger::new();
        let err = checkout(
            &ledger,
            &Providers::default(),
            &caller(Uuid::new_v4(), Role::User),
            Uuid::new_v4(),
            "VNPay",
            &context(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { resource, .. } if resource == "Booking"));
    }

    #[test_log::test(tokio::test)]
    async fn test_admin_cannot_pay_for_someone_else() {
        let ledger = InMemoryLedger::new();
        let tour = seed_tour(&ledger, Decimal::new(100, 0)).await;
        let booking = seed_booking(&ledger, Uuid::new_v4(), tour.id, 2).await;

        let err = checkout(
            &ledger,
            &Providers::default(),
            &caller(Uuid::new_v4(), Role::Admin),
            booking.id,
            "VNPay",
            &context(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NotOwner { .. }));
        assert!(ledger.list_payments_for_booking(booking.id).await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_unsupported_method_still_records_attempt() {
        let ledger = InMemoryLedger::new();
        let owner = Uuid::new_v4();
        let tour = seed_tour(&ledger, Decimal::new(100, 0)).await;
        let booking = seed_booking(&ledger, owner, tour.id, 3).await;

        let err = checkout(&ledger, &Providers::default(), &caller(owner, Role::User), booking.id, "vnpay", &context())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod { method } if method == "vnpay"));

        let payments = ledger.list_payments_for_booking(booking.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].method, "vnpay");
        assert_eq!(payments[0].amount, 30000);
        assert_eq!(payments[0].status, PaymentStatus::Pending);
    }

    #[test_log::test(tokio::test)]
    async fn test_unconfigured_gateway() {
        let ledger = InMemoryLedger::new();
        let owner = Uuid::new_v4();
        let tour = seed_tour(&ledger, Decimal::new(100, 0)).await;
        let booking = seed_booking(&ledger, owner, tour.id, 1).await;

        let err = checkout(&ledger, &Providers::default(), &caller(owner, Role::User), booking.id, "Stripe", &context())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotImplemented { .. }));
    }
}
