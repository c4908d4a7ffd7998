// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tests for session key derivation

use sensor_envelope::crypto::{derive_session_key, CryptoError, SharedSecret, KDF_CONTEXT_MAX_LEN};

#[test]
fn test_deterministic() {
    let secret = SharedSecret::from_bytes([11u8; 32]);
    let a = derive_session_key(&secret, "climates", 1).unwrap();
    let b = derive_session_key(&secret, "climates", 1).unwrap();
    assert_eq!(a.as_bytes(), b.as_bytes());
}

#[test]
fn test_secret_separates_keys() {
    let a = derive_session_key(&SharedSecret::from_bytes([11u8; 32]), "climates", 1).unwrap();
    let b = derive_session_key(&SharedSecret::from_bytes([12u8; 32]), "climates", 1).unwrap();
    assert_ne!(a.as_bytes(), b.as_bytes());
}

#[test]
fn test_key_is_not_the_secret() {
    let secret = SharedSecret::from_bytes([11u8; 32]);
    let key = derive_session_key(&secret, "climates", 1).unwrap();
    assert_ne!(key.as_bytes(), secret.as_bytes());
}

#[test]
fn test_context_prefixes_do_not_collide() {
    // "climate" + id must never equal "climates" + id
    let secret = SharedSecret::from_bytes([11u8; 32]);
    let a = derive_session_key(&secret, "climate", 1).unwrap();
    let b = derive_session_key(&secret, "climates", 1).unwrap();
    assert_ne!(a.as_bytes(), b.as_bytes());
}

#[test]
fn test_context_length_boundaries() {
    let secret = SharedSecret::from_bytes([11u8; 32]);

    let max = "x".repeat(KDF_CONTEXT_MAX_LEN);
    assert!(derive_session_key(&secret, &max, 1).is_ok());

    let too_long = "x".repeat(KDF_CONTEXT_MAX_LEN + 1);
    match derive_session_key(&secret, &too_long, 1) {
        Err(CryptoError::InvalidContext { context, .. }) => assert_eq!(context, too_long),
        other => panic!("Expected InvalidContext, got {:?}", other),
    }

    assert!(matches!(
        derive_session_key(&secret, "", 1),
        Err(CryptoError::InvalidContext { .. })
    ));
}

#[test]
fn test_multibyte_context_counts_bytes() {
    let secret = SharedSecret::from_bytes([11u8; 32]);
    // Two bytes per character
    assert!(derive_session_key(&secret, "éééé", 1).is_ok());
    assert!(derive_session_key(&secret, "ééééé", 1).is_err());
}

#[test]
fn test_debug_output_is_redacted() {
    let key = derive_session_key(&SharedSecret::from_bytes([11u8; 32]), "climates", 1).unwrap();
    assert_eq!(format!("{:?}", key), "SessionKey([REDACTED])");
}
