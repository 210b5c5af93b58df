//! Webhook signature verification.
//!
//! Deliveries carry a `Gateway-Signature` header of the form
//! `t=<unix seconds>,v1=<hex digest>` where the digest is
//! `SHA-256(secret "." timestamp "." body)`. Verification checks the
//! timestamp against a replay tolerance and compares digests in constant
//! time.

use jiff::Timestamp;
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};

pub const SIGNATURE_HEADER: &str = "gateway-signature";

#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: i64,
}

/// Digest over the dotted secret, timestamp and raw body.
fn expected_signature(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b".");
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(b".");
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Builds the header value a sender attaches. Shared with tests and the
/// development seeder.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    format!(
        "t={},v1={}",
        timestamp,
        expected_signature(secret, timestamp, body)
    )
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

fn invalid(reason: &str) -> AppError {
    AppError::BadRequest {
        message: format!("invalid webhook signature: {}", reason),
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: tolerance_secs.max(0),
        }
    }

    pub fn verify(&self, header: &str, body: &[u8]) -> AppResult<()> {
        self.verify_at(header, body, Timestamp::now())
    }

    /// Verification against an explicit clock, so tolerance windows are
    /// testable.
    pub fn verify_at(&self, header: &str, body: &[u8], now: Timestamp) -> AppResult<()> {
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(value.parse().map_err(|_| invalid("bad timestamp"))?);
                }
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| invalid("missing timestamp"))?;
        if signatures.is_empty() {
            return Err(invalid("missing v1 signature"));
        }
        if (now.as_second() - timestamp).abs() > self.tolerance_secs {
            return Err(invalid("timestamp outside tolerance"));
        }

        let expected = expected_signature(&self.secret, timestamp, body);
        if signatures
            .iter()
            .any(|candidate| constant_time_eq(candidate.as_bytes(), expected.as_bytes()))
        {
            Ok(())
        } else {
            Err(invalid("digest mismatch"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    fn now() -> Timestamp {
        Timestamp::now()
    }

    #[test]
    fn valid_signature_passes() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        let body = br#"{"id":"evt_1"}"#;
        let header = sign(SECRET, now().as_second(), body);
        assert!(verifier.verify_at(&header, body, now()).is_ok());
    }

    #[test]
    fn tampered_body_fails() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        let header = sign(SECRET, now().as_second(), br#"{"id":"evt_1"}"#);
        let err = verifier
            .verify_at(&header, br#"{"id":"evt_2"}"#, now())
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest { .. }));
    }

    #[test]
    fn wrong_secret_fails() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        let body = b"payload";
        let header = sign("whsec_other", now().as_second(), body);
        assert!(verifier.verify_at(&header, body, now()).is_err());
    }

    #[test]
    fn stale_timestamp_fails() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        let body = b"payload";
        let stale = now().as_second() - 301;
        let header = sign(SECRET, stale, body);
        let err = verifier.verify_at(&header, body, now()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("tolerance"), "{}", message);
    }

    #[test]
    fn second_v1_entry_can_match() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        let body = b"payload";
        let ts = now().as_second();
        let good = expected_signature(SECRET, ts, body);
        let header = format!("t={},v1={},v1={}", ts, "0".repeat(64), good);
        assert!(verifier.verify_at(&header, body, now()).is_ok());
    }

    #[test]
    fn malformed_header_fails() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        assert!(verifier.verify_at("v1=abc", b"payload", now()).is_err());
        assert!(verifier.verify_at("t=notanumber,v1=abc", b"payload", now()).is_err());
        assert!(verifier.verify_at("", b"payload", now()).is_err());
    }
}
