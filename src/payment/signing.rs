//! HMAC-SHA512 signing of gateway parameter sets.
//!
//! The signed message is the canonical query string: parameters sorted by
//! key, key and value form-urlencoded (space as `+`), joined with `&`.

use std::collections::BTreeMap;

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;
use url::form_urlencoded::byte_serialize;

type HmacSha512 = Hmac<Sha512>;

pub const SECURE_HASH_FIELD: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE_FIELD: &str = "vnp_SecureHashType";

fn encode(s: &str) -> String {
    byte_serialize(s.as_bytes()).collect()
}

/// Canonical string over every parameter except the hash fields
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(k, _)| k.as_str() != SECURE_HASH_FIELD && k.as_str() != SECURE_HASH_TYPE_FIELD)
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lowercase hex HMAC-SHA512 of `message`
pub fn sign(secret: &[u8], message: &str) -> Result<String, InvalidLength> {
    let mut mac = HmacSha512::new_from_slice(secret)?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Recompute the signature of `params` and compare it to `provided_hex` in
/// constant time. Hex case is ignored; malformed hex never matches.
pub fn verify(secret: &[u8], params: &BTreeMap<String, String>, provided_hex: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex.trim()) else {
        return false;
    };

    let mut mac = match HmacSha512::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(canonical_query(params).as_bytes());
    let expected = mac.finalize().into_bytes();

    expected.as_slice().ct_eq(provided.as_slice()).unwrap_u8() == 1
}
