//! HMAC-SHA256 body signatures.
//!
//! The signature is the lowercase hex HMAC of the exact body bytes under the
//! endpoint secret. Receivers recompute it over the raw body they received.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::webhook::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Stateless signer for webhook bodies.
pub struct WebhookSigner;

impl WebhookSigner {
    /// Sign a body.
    ///
    /// # Errors
    /// * `WebhookError::Signing` if the key cannot initialize the MAC
    pub fn sign(secret: &str, body: &[u8]) -> Result<String, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| WebhookError::Signing(e.to_string()))?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check a hex signature against a body in constant time.
    #[must_use]
    pub fn verify(secret: &str, body: &[u8], signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    }
}
