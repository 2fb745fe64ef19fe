//! VNPay payment provider implementation
//!
//! Checkout redirects the customer to the VNPay payment page with a signed query string.
//! VNPay reports the outcome twice, both as signed GET queries: the browser `return` and the
//! server-to-server `IPN`. Both go through [`VnpayProvider::verify_callback`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};

use crate::config::VnpayConfig;
use crate::payment_providers::{
    PaymentError, PaymentMethod, PaymentProvider, RedirectRequest, Result,
    signing::{self, SECURE_HASH_PARAM},
};

const VERSION: &str = "2.1.0";
const COMMAND: &str = "pay";
const CURRENCY: &str = "VND";
const ORDER_TYPE: &str = "other";

/// `vnp_ResponseCode` of a successful payment
pub const SUCCESS_CODE: &str = "00";

/// A verified VNPay return or IPN query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnpayCallback {
    /// `vnp_TxnRef` as sent at checkout (a payment id)
    pub txn_ref: String,
    pub response_code: String,
    /// VNPay's own transaction number, when present
    pub transaction_no: Option<String>,
}

impl VnpayCallback {
    pub fn is_success(&self) -> bool {
        self.response_code == SUCCESS_CODE
    }
}

/// VNPay payment provider
pub struct VnpayProvider {
    config: VnpayConfig,
    offset: FixedOffset,
}

impl VnpayProvider {
    pub fn new(config: VnpayConfig) -> Result<Self> {
        let offset = config
            .utc_offset()
            .ok_or_else(|| PaymentError::InvalidData(format!("Invalid VNPay UTC offset: {} minutes", config.utc_offset_minutes)))?;
        Ok(Self { config, offset })
    }

    /// The unsigned redirect parameters for a payment, created at `now`
    pub fn redirect_params(&self, request: &RedirectRequest<'_>, now: DateTime<Utc>) -> Result<BTreeMap<&'static str, String>> {
        // VNPay expects the amount multiplied by 100 on top of the ledger's minor units
        let amount = request
            .payment
            .amount
            .checked_mul(100)
            .ok_or_else(|| PaymentError::InvalidData(format!("Payment amount {} is out of range", request.payment.amount)))?;

        let create_date = now.with_timezone(&self.offset).format("%Y%m%d%H%M%S").to_string();

        Ok(BTreeMap::from([
            ("vnp_Version", VERSION.to_string()),
            ("vnp_Command", COMMAND.to_string()),
            ("vnp_TmnCode", self.config.tmn_code.clone()),
            ("vnp_Amount", amount.to_string()),
            ("vnp_CurrCode", CURRENCY.to_string()),
            ("vnp_TxnRef", request.payment.id.to_string()),
            ("vnp_OrderInfo", format!("Thanh toan booking {}", request.booking.id)),
            ("vnp_OrderType", ORDER_TYPE.to_string()),
            ("vnp_Locale", self.config.locale.clone()),
            ("vnp_ReturnUrl", self.config.return_url.clone()),
            ("vnp_IpAddr", request.context.client_ip.clone()),
            ("vnp_CreateDate", create_date),
        ]))
    }

    /// Sign the parameters and encode them onto the configured payment page URL
    pub fn signed_url(&self, params: &BTreeMap<&'static str, String>) -> String {
        let hash = signing::sign(params, &self.config.hash_secret);

        let mut url = self.config.url.clone();
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair(SECURE_HASH_PARAM, &hash);
        }
        url.into()
    }

    /// Verify the checksum of a return/IPN query and extract the fields reconciliation needs.
    ///
    /// # Errors
    /// - `InvalidSignature` if the hash is missing or does not match
    /// - `InvalidData` if `vnp_TxnRef` or `vnp_ResponseCode` is missing
    pub fn verify_callback(&self, query: &BTreeMap<String, String>) -> Result<VnpayCallback> {
        let provided = query
            .get(SECURE_HASH_PARAM)
            .ok_or_else(|| PaymentError::InvalidSignature("Missing vnp_SecureHash".to_string()))?;

        if !signing::verify(query, provided, &self.config.hash_secret) {
            return Err(PaymentError::InvalidSignature("Invalid checksum".to_string()));
        }

        let field = |name: &str| {
            query
                .get(name)
                .cloned()
                .ok_or_else(|| PaymentError::InvalidData(format!("Missing {name}")))
        };

        Ok(VnpayCallback {
            txn_ref: field("vnp_TxnRef")?,
            response_code: field("vnp_ResponseCode")?,
            transaction_no: query.get("vnp_TransactionNo").cloned(),
        })
    }
}

#[async_trait]
impl PaymentProvider for VnpayProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::VNPay
    }

    async fn build_redirect(&self, request: &RedirectRequest<'_>) -> Result<String> {
        let params = self.redirect_params(request, Utc::now())?;
        let url = self.signed_url(&params);

        tracing::info!(
            payment_id = %request.payment.id,
            booking_id = %request.booking.id,
            "Built VNPay redirect"
        );

        Ok(url)
    }
}
