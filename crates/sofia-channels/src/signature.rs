//! Webhook payload signature verification.
//!
//! Meta signs every POST body with HMAC-SHA256 over the raw bytes and
//! sends the result as `X-Hub-Signature-256: sha256=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{error, warn};

type HmacSha256 = Hmac<Sha256>;

/// Verify an inbound payload against its signature header.
///
/// Comparison is constant-time (`Mac::verify_slice`). An empty secret
/// fails closed in production; outside production it is an explicit
/// unsafe bypass, allowed with a warning so local testing works without
/// Meta credentials. Malformed input is never an error, just `false`.
pub fn verify(
    raw_body: &[u8],
    signature_header: Option<&str>,
    secret: &str,
    production: bool,
) -> bool {
    if secret.is_empty() {
        if production {
            error!("signature secret missing in production — rejecting payload");
            return false;
        }
        warn!("signature secret missing — accepting UNVERIFIED payload (non-production)");
        return true;
    }

    let Some(header) = signature_header else {
        return false;
    };
    let Some(signature_hex) = header.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(signature_hex.trim()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&signature_bytes).is_ok()
}
