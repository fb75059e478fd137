//! HMAC-SHA256 signature verification for gateway callbacks.
//!
//! Both checks fail closed: a missing or empty secret, a malformed hex
//! signature, or a length mismatch is a verification failure, never a panic.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn hmac_hex(secret: &str, payload: &[u8]) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Client confirmation mode: the signature covers
/// `{provider_order_id}|{provider_payment_id}`, signed with the key secret.
pub fn verify_payment_signature(
    key_secret: &str,
    provider_order_id: &str,
    provider_payment_id: &str,
    signature: &str,
) -> bool {
    let payload = format!("{provider_order_id}|{provider_payment_id}");
    match hmac_hex(key_secret, payload.as_bytes()) {
        Some(expected) => constant_time_eq(&expected, signature),
        None => false,
    }
}

/// Webhook mode: the signature covers the exact raw body bytes, signed with
/// the dedicated webhook secret.
pub fn verify_webhook_signature(webhook_secret: &str, raw_body: &[u8], signature: &str) -> bool {
    match hmac_hex(webhook_secret, raw_body) {
        Some(expected) => constant_time_eq(&expected, signature),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(secret: &str, payload: &[u8]) -> String {
        hmac_hex(secret, payload).unwrap()
    }

    #[test]
    fn payment_signature_accepts_valid() {
        let sig = sign(SECRET, b"order_gw_1|pay_1");
        assert!(verify_payment_signature(SECRET, "order_gw_1", "pay_1", &sig));
    }

    #[test]
    fn payment_signature_rejects_single_char_tamper() {
        let mut sig = sign(SECRET, b"order_gw_1|pay_1");
        // Flip the last hex digit.
        let last = sig.pop().unwrap();
        sig.push(if last == '0' { '1' } else { '0' });
        assert!(!verify_payment_signature(SECRET, "order_gw_1", "pay_1", &sig));
    }

    #[test]
    fn payment_signature_rejects_wrong_length() {
        let sig = sign(SECRET, b"order_gw_1|pay_1");
        assert!(!verify_payment_signature(
            SECRET,
            "order_gw_1",
            "pay_1",
            &sig[..10]
        ));
    }

    #[test]
    fn empty_secret_fails_closed() {
        let sig = sign(SECRET, b"payload");
        assert!(!verify_webhook_signature("", b"payload", &sig));
        assert!(!verify_payment_signature("", "a", "b", &sig));
    }

    #[test]
    fn webhook_signature_covers_raw_bytes() {
        let body = br#"{"event":"payment.captured","id":"evt_1"}"#;
        let sig = sign(SECRET, body);
        assert!(verify_webhook_signature(SECRET, body, &sig));
        // Any byte change in the body invalidates the signature.
        let tampered = br#"{"event":"payment.captured","id":"evt_2"}"#;
        assert!(!verify_webhook_signature(SECRET, tampered, &sig));
    }
}
