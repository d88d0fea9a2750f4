//! Webhook signature verification
//!
//! Both external systems sign the raw request body with HMAC-SHA256 and
//! send the hex digest in a header. Verification runs over the exact
//! bytes received — before any JSON parsing — and uses a constant-time
//! comparison.

use ring::hmac;

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hex::encode(hmac::sign(&key, body).as_ref())
}

/// Verify a hex signature against the raw body (constant-time).
pub fn verify_signature(secret: &str, body: &[u8], provided_hex: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex.trim()) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hmac::verify(&key, body, &provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_verifies() {
        let body = br#"{"shipment_id":"S1","shipment_status_id":7}"#;
        let sig = compute_signature("topsecret", body);
        assert!(verify_signature("topsecret", body, &sig));
        // header values often arrive with whitespace
        assert!(verify_signature("topsecret", body, &format!(" {sig}\n")));
    }

    #[test]
    fn rejects_wrong_secret_body_or_encoding() {
        let body = b"payload";
        let sig = compute_signature("secret-a", body);
        assert!(!verify_signature("secret-b", body, &sig));
        assert!(!verify_signature("secret-a", b"other payload", &sig));
        assert!(!verify_signature("secret-a", body, "not-hex!"));
        assert!(!verify_signature("secret-a", body, ""));
    }
}
