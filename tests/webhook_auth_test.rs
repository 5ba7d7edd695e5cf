use hmac::{Hmac, Mac};
use sha2::Sha256;

use immopay_core::error::AppError;
use immopay_core::handlers::webhook::verify_signature;

type HmacSha256 = Hmac<Sha256>;

fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[test]
fn test_hmac_signature_generation() {
    let signature = sign("test_secret_key", br#"{"transaction_id":"txn","status":"ACCEPTED"}"#);

    // SHA256 produces 32 bytes = 64 hex chars
    assert_eq!(signature.len(), 64);
    assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_signature_verification_round_trip() {
    let payload = br#"{"transaction_id":"txn_a3f2_17_9c1d4e8b","status":"ACCEPTED"}"#;
    let signature = sign("test_secret_key", payload);

    assert!(verify_signature("test_secret_key", payload, &signature).is_ok());
}

#[test]
fn test_signature_rejects_tampered_payload() {
    let payload = br#"{"transaction_id":"txn_a3f2_17_9c1d4e8b","status":"ACCEPTED"}"#;
    let tampered = br#"{"transaction_id":"txn_a3f2_17_9c1d4e8b","status":"REFUSED"}"#;
    let signature = sign("test_secret_key", payload);

    let err = verify_signature("test_secret_key", tampered, &signature).unwrap_err();
    assert!(matches!(err, AppError::InvalidSignature));
}

#[test]
fn test_signature_rejects_wrong_secret() {
    let payload = br#"{"transaction_id":"txn","status":"ACCEPTED"}"#;
    let signature = sign("some_other_secret", payload);

    let err = verify_signature("test_secret_key", payload, &signature).unwrap_err();
    assert!(matches!(err, AppError::InvalidSignature));
}

#[test]
fn test_signature_rejects_non_hex_input() {
    let payload = br#"{"transaction_id":"txn","status":"ACCEPTED"}"#;

    let err = verify_signature("test_secret_key", payload, "zz-not-hex").unwrap_err();
    assert!(matches!(err, AppError::InvalidSignature));
}

#[test]
fn test_signature_tolerates_surrounding_whitespace() {
    let payload = br#"{"transaction_id":"txn","status":"ACCEPTED"}"#;
    let signature = format!("  {}\n", sign("test_secret_key", payload));

    assert!(verify_signature("test_secret_key", payload, &signature).is_ok());
}

#[test]
fn test_constant_time_comparison() {
    // The hmac crate uses constant-time comparison internally
    // This test verifies that different signatures fail verification
    let secret = "test_secret_key";

    let mut mac1 = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac1.update(b"payload1");
    let sig1 = mac1.finalize().into_bytes();

    let mut mac2 = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac2.update(b"payload2");

    assert!(mac2.verify_slice(&sig1).is_err());
}
