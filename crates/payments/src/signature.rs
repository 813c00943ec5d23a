//! Webhook signature verification.
//!
//! The gateway signs `timestamp + raw_body` with HMAC-SHA256 under the shared
//! webhook secret and sends the base64 digest in `x-webhook-signature`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

/// Verifies webhook signatures against a shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(timestamp.as_bytes());
        mac.update(body);
        mac
    }

    /// Computes the base64 signature for a payload.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        STANDARD.encode(self.mac(timestamp, body).finalize().into_bytes())
    }

    /// Returns `true` when a non-empty secret is configured.
    pub fn is_configured(&self) -> bool {
        !self.secret.is_empty()
    }

    /// Checks the signature headers against the raw body.
    ///
    /// The timestamp must be an integer. The digest comparison runs in
    /// constant time. An empty secret rejects every payload.
    pub fn verify(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        if !self.is_configured() {
            return Err(SignatureError::SecretNotConfigured);
        }
        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?;
        let timestamp = timestamp
            .filter(|t| !t.is_empty())
            .ok_or(SignatureError::MissingHeader(TIMESTAMP_HEADER))?;
        if timestamp.trim().parse::<i64>().is_err() {
            return Err(SignatureError::InvalidTimestamp);
        }

        let provided = STANDARD
            .decode(signature.trim())
            .map_err(|_| SignatureError::Mismatch)?;
        self.mac(timestamp, body)
            .verify_slice(&provided)
            .map_err(|_| SignatureError::Mismatch)
    }
}
