//! Upstream request signatures.
//!
//! The hub signs every request with each of its access keys:
//! `sha256=` followed by the hex HMAC-SHA256 of the connection id. All
//! signatures travel comma-separated in one header so a key can be
//! rotated while both the old and the new one are accepted.

use hmac::{Hmac, Mac};
use http::Request;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::headers::{header_value, parse_signatures, CONNECTION_ID_HEADER, SIGNATURE_HEADER};

type HmacSha256 = Hmac<Sha256>;

/// Prefix of every signature value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Signature of `connection_id` under `access_key`, prefix included.
pub fn compute_signature(access_key: &str, connection_id: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(access_key.as_bytes()).ok()?;
    mac.update(connection_id.as_bytes());

    Some(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Whether any candidate key produces any of the carried signatures.
///
/// Comparison ignores hex case.
pub fn signature_matches(connection_id: &str, signatures: &[String], access_keys: &[String]) -> bool {
    let carried: Vec<String> = signatures.iter().map(|s| s.to_ascii_lowercase()).collect();

    access_keys
        .iter()
        .filter(|key| !key.is_empty())
        .filter_map(|key| compute_signature(key, connection_id))
        .any(|expected| {
            carried
                .iter()
                .any(|candidate| bool::from(candidate.as_bytes().ct_eq(expected.as_bytes())))
        })
}

/// Validate the signature header of an upstream request.
///
/// Fails when the header or connection id is missing, when no keys are
/// configured, or when nothing matches.
pub fn validate_signature<B>(request: &Request<B>, access_keys: &[String]) -> bool {
    let headers = request.headers();

    let Some(connection_id) = header_value(headers, CONNECTION_ID_HEADER) else {
        tracing::debug!("Signature check without a connection id");
        return false;
    };
    let Some(raw) = header_value(headers, SIGNATURE_HEADER) else {
        tracing::debug!("Request for connection {} carries no signature", connection_id);
        return false;
    };

    signature_matches(&connection_id, &parse_signatures(&raw), access_keys)
}
