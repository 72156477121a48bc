use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignError {
    #[error("signing secret was rejected by the hmac key schedule")]
    InvalidKey,
}

/// Computes the custom-robot signature for one request: HMAC-SHA256 over
/// `"{timestamp}\n{secret}"` keyed with the secret, base64-encoded, then
/// percent-encoded for use as a query parameter.
///
/// The platform rejects requests whose timestamp drifts too far from server
/// time, so the signature must be computed immediately before the request is
/// sent, never cached.
pub fn compute_signature(secret: &str, timestamp_ms: i64) -> Result<String, SignError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignError::InvalidKey)?;
    mac.update(format!("{timestamp_ms}\n{secret}").as_bytes());
    let digest = BASE64.encode(mac.finalize().into_bytes());
    Ok(urlencoding::encode(&digest).into_owned())
}

/// Appends `timestamp` and `sign` query parameters to a webhook URL.
pub fn signed_url(base_url: &str, secret: &str, timestamp_ms: i64) -> Result<String, SignError> {
    let sign = compute_signature(secret, timestamp_ms)?;
    let separator = if base_url.contains('?') { '&' } else { '?' };
    Ok(format!("{base_url}{separator}timestamp={timestamp_ms}&sign={sign}"))
}
