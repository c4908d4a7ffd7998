// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crypto Error Types Tests
//!
//! These tests verify that each failure surfaces as the right kind:
//! - every taxonomy variant exists and has a stable kind name
//! - malformed wire input maps to SerializationError or InvalidPeerKey
//! - authentication failures carry no detail beyond the operation

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sensor_envelope::crypto::{
    CryptoError, EncryptedEnvelope, ServerIdentity, ServerKeyPair, WireEnvelope,
};

/// Test that CryptoError has all expected error variants
#[test]
fn test_crypto_error_kinds() {
    let cases = [
        (
            CryptoError::InvalidIdentifier {
                reason: "empty".to_string(),
            },
            "invalid_identifier",
        ),
        (
            CryptoError::InvalidPeerKey {
                key_type: "server_public_key".to_string(),
                reason: "31 bytes".to_string(),
            },
            "invalid_peer_key",
        ),
        (
            CryptoError::InvalidContext {
                context: String::new(),
                reason: "empty".to_string(),
            },
            "invalid_context",
        ),
        (
            CryptoError::SerializationError {
                operation: "decode_nonce".to_string(),
                reason: "short".to_string(),
            },
            "serialization_error",
        ),
        (
            CryptoError::AuthenticationFailure {
                operation: "open".to_string(),
            },
            "authentication_failure",
        ),
        (
            CryptoError::DerivationError {
                operation: "hkdf_expand".to_string(),
                reason: "length".to_string(),
            },
            "derivation_error",
        ),
        (
            CryptoError::CacheFetchError {
                reason: "timed out".to_string(),
            },
            "cache_fetch_error",
        ),
    ];

    for (err, kind) in cases {
        assert_eq!(err.kind(), kind);
        assert!(!err.to_string().is_empty());
    }
}

#[test]
fn test_wire_envelope_bad_base64() {
    let wire = WireEnvelope {
        ciphertext: "%%%".to_string(),
        nonce: BASE64.encode([0u8; 12]),
        device_public_key: BASE64.encode([9u8; 32]),
    };
    let err = EncryptedEnvelope::try_from(&wire).unwrap_err();
    assert_eq!(err.kind(), "serialization_error");
}

#[test]
fn test_wire_envelope_bad_device_key() {
    let wire = WireEnvelope {
        ciphertext: BASE64.encode([1u8; 40]),
        nonce: BASE64.encode([0u8; 12]),
        device_public_key: BASE64.encode([9u8; 31]),
    };
    let err = EncryptedEnvelope::try_from(&wire).unwrap_err();
    assert_eq!(err.kind(), "invalid_peer_key");
}

#[test]
fn test_server_identity_from_bad_base64() {
    let err = ServerIdentity::from_base64("not base64!!").unwrap_err();
    assert_eq!(err.kind(), "invalid_peer_key");

    let err = ServerIdentity::from_base64(&BASE64.encode([1u8; 16])).unwrap_err();
    assert_eq!(err.kind(), "invalid_peer_key");
}

#[test]
fn test_server_private_key_length() {
    let err = ServerKeyPair::from_bytes(&[1u8; 31]).unwrap_err();
    assert_eq!(err.kind(), "derivation_error");
}

#[test]
fn test_authentication_failure_has_no_detail() {
    let err = CryptoError::AuthenticationFailure {
        operation: "open".to_string(),
    };
    assert_eq!(err.to_string(), "Authentication failed during open");
}
