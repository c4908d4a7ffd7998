// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version and protocol information for sensor-envelope

use crate::crypto::{DEFAULT_KDF_CONTEXT, DEFAULT_KDF_KEY_ID, DERIVATION_SCHEME_VERSION};

/// Crate version
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Envelope wire format version
pub const WIRE_FORMAT_VERSION: u32 = 1;

/// Primitive suite, for compatibility checks between peers
pub const CIPHER_SUITE: &[&str] = &[
    "x25519",
    "kx-sha512",
    "hkdf-sha256",
    "chacha20poly1305-ietf",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!(
        "sensor-envelope {} (wire v{}, derivation v{})",
        VERSION_NUMBER, WIRE_FORMAT_VERSION, DERIVATION_SCHEME_VERSION
    )
}

/// Get full version info as JSON
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "wireFormat": WIRE_FORMAT_VERSION,
        "derivationScheme": DERIVATION_SCHEME_VERSION,
        "cipherSuite": CIPHER_SUITE,
        "defaultContext": DEFAULT_KDF_CONTEXT,
        "defaultKeyId": DEFAULT_KDF_KEY_ID,
    })
}
