//! HMAC signing for gateway redirects and callbacks.
//!
//! VNPay signs the query string of every redirect and callback:
//! - Parameters are sorted by key and joined as `key=value` with `&`, values not escaped
//! - The signature is hex-encoded HMAC-SHA512 of that string with the merchant hash secret
//! - `vnp_SecureHash` / `vnp_SecureHashType` carry the signature and are excluded from it
//!
//! Stripe webhook signatures (HMAC-SHA256 over `{timestamp}.{payload}`) reuse
//! [`constant_time_eq`] from here; see [`super::stripe`].

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

/// Query parameter carrying the checksum
pub const SECURE_HASH_PARAM: &str = "vnp_SecureHash";

/// Query parameter naming the hash algorithm, sent by some gateway versions
pub const SECURE_HASH_TYPE_PARAM: &str = "vnp_SecureHashType";

/// Build the canonical string that gets signed: sorted `key=value` pairs joined by `&`.
///
/// Values are used verbatim; no percent-encoding is applied.
pub fn canonical_query<K, V>(params: &BTreeMap<K, V>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign gateway parameters.
///
/// The caller must not include the hash parameters themselves.
///
/// # Returns
///
/// Lowercase hex HMAC-SHA512 of the canonical query string.
pub fn sign<K, V>(params: &BTreeMap<K, V>, secret: &str) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    };
    mac.update(canonical_query(params).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a checksum sent back by the gateway.
///
/// `params` is the full callback query; the hash parameters are stripped before
/// recomputing. Comparison is constant time and ignores hex digit case.
pub fn verify(params: &BTreeMap<String, String>, provided_hash: &str, secret: &str) -> bool {
    let signed: BTreeMap<&str, &str> = params
        .iter()
        .filter(|(k, _)| k.as_str() != SECURE_HASH_PARAM && k.as_str() != SECURE_HASH_TYPE_PARAM)
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let expected = sign(&signed, secret);
    constant_time_eq(provided_hash.to_ascii_lowercase().as_bytes(), expected.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
