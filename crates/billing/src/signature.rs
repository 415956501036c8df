//! Notification signature verification
//!
//! The settlement webhook is unauthenticated; the keyed hash is its sole
//! authentication. The gateway signs `order_id + status_code + gross_amount +
//! server_key` with SHA-512, hex-encoded.

use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

/// Compute the expected notification signature
pub fn notification_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a notification signature in constant time
pub fn verify_signature(
    provided: &str,
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> bool {
    let expected = notification_signature(order_id, status_code, gross_amount, server_key);
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let sig = notification_signature("TOKEN-1", "200", "1000", "secret");
        assert!(verify_signature(&sig, "TOKEN-1", "200", "1000", "secret"));
    }

    #[test]
    fn test_tampered_amount_rejected() {
        let sig = notification_signature("TOKEN-1", "200", "1000", "secret");
        assert!(!verify_signature(&sig, "TOKEN-1", "200", "999999", "secret"));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let sig = notification_signature("TOKEN-1", "200", "1000", "secret");
        assert!(!verify_signature(&sig, "TOKEN-1", "200", "1000", "other-secret"));
    }

    #[test]
    fn test_signature_is_hex_sha512() {
        let sig = notification_signature("a", "b", "c", "d");
        assert_eq!(sig.len(), 128);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
