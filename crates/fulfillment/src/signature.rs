//! Webhook signature verification.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Verifies `base64(HMAC-SHA256(secret, timestamp + body))` signatures.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: Option<u64>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl SignatureVerifier {
    /// Creates a verifier that accepts any timestamp.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: None,
        }
    }

    /// Rejects timestamps further than `tolerance_secs` from now.
    pub fn with_tolerance(mut self, tolerance_secs: u64) -> Self {
        self.tolerance_secs = Some(tolerance_secs);
        self
    }

    /// Checks a delivery. Both headers are required.
    ///
    /// The digest is compared in constant time.
    pub fn verify(
        &self,
        body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
    ) -> Result<(), SignatureError> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::MissingSignature)?;
        let timestamp = timestamp
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(SignatureError::MissingTimestamp)?;

        if let Some(tolerance_secs) = self.tolerance_secs {
            let sent_at: i64 = timestamp
                .parse()
                .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_string()))?;
            let skew_secs = Utc::now().timestamp() - sent_at;
            if skew_secs.unsigned_abs() > tolerance_secs {
                return Err(SignatureError::Stale {
                    skew_secs,
                    tolerance_secs,
                });
            }
        }

        let supplied = STANDARD
            .decode(signature)
            .map_err(|_| SignatureError::Mismatch)?;

        self.mac(timestamp, body)?
            .verify_slice(&supplied)
            .map_err(|_| SignatureError::Mismatch)
    }

    /// Signs a delivery the way the gateway does.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
        let mac = self.mac(timestamp, body)?;
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;
        mac.update(timestamp.as_bytes());
        mac.update(body);
        Ok(mac)
    }
}
