//! Bus middleware: cross-cutting inspection of envelopes before delivery.
//!
//! Middleware runs in registration order, fixed at bus construction time. A
//! rejection aborts delivery for that publish call.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::domain::models::EventEnvelope;
use crate::services::event_bus::pattern_matches;

type HmacSha256 = Hmac<Sha256>;

/// Rejection raised by a middleware.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MiddlewareError(pub String);

/// A cross-cutting envelope inspector.
///
/// Implementations may inspect and reject, never mutate; the same envelope
/// instance continues down the chain.
pub trait BusMiddleware: Send + Sync {
    fn name(&self) -> &str;

    fn inspect(&self, envelope: &EventEnvelope) -> Result<(), MiddlewareError>;
}

/// Requires a valid HMAC-SHA256 signature on envelopes published to
/// sensitive channels (dot-namespace prefixes). Other channels pass through
/// untouched.
pub struct SignatureMiddleware {
    secret: Vec<u8>,
    sensitive_prefixes: Vec<String>,
}

impl SignatureMiddleware {
    pub fn new(secret: impl AsRef<[u8]>, sensitive_prefixes: Vec<String>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            sensitive_prefixes,
        }
    }

    /// Compute the hex signature a producer should attach to `envelope`.
    pub fn sign(&self, envelope: &EventEnvelope) -> String {
        hex::encode(self.digest(envelope))
    }

    fn digest(&self, envelope: &EventEnvelope) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(envelope.event_type.as_bytes());
        mac.update(b"\n");
        mac.update(envelope.source.as_bytes());
        mac.update(b"\n");
        // Struct field order makes this serialization stable per process.
        let payload =
            serde_json::to_vec(&envelope.payload).unwrap_or_default();
        mac.update(&payload);
        mac.finalize().into_bytes().to_vec()
    }

    fn is_sensitive(&self, event_type: &str) -> bool {
        self.sensitive_prefixes
            .iter()
            .any(|prefix| pattern_matches(prefix, event_type))
    }
}

impl BusMiddleware for SignatureMiddleware {
    fn name(&self) -> &str {
        "signature"
    }

    fn inspect(&self, envelope: &EventEnvelope) -> Result<(), MiddlewareError> {
        if !self.is_sensitive(&envelope.event_type) {
            return Ok(());
        }

        let signature = envelope.signature.as_deref().ok_or_else(|| {
            MiddlewareError(format!(
                "unsigned envelope on sensitive channel '{}'",
                envelope.event_type
            ))
        })?;

        let provided = hex::decode(signature)
            .map_err(|_| MiddlewareError("malformed signature".to_string()))?;
        let expected = self.digest(envelope);

        let matches: bool = provided.ct_eq(&expected).into();
        if matches {
            Ok(())
        } else {
            Err(MiddlewareError(format!(
                "invalid signature on sensitive channel '{}'",
                envelope.event_type
            )))
        }
    }
}
