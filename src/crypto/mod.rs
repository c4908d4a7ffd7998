// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Sensor Envelope Cryptography
//!
//! This module implements the primitives that protect a temperature/humidity
//! reading between the device that measured it and the collector that stores
//! it:
//!
//! - **Identity**: Deterministic X25519 device keypairs derived from the device id
//! - **ECDH**: Static-static X25519 agreement with kx-style directional sub-keys
//! - **KDF**: HKDF-SHA256 session keys bound to a context label and key id
//! - **Encryption**: ChaCha20-Poly1305 (IETF, 12-byte nonce) AEAD envelopes
//! - **Key Store**: Persisted device keypairs with an in-process memo
//!
//! ## Security Considerations
//!
//! - Shared secrets and session keys are recomputed per operation and never stored
//! - Nonces are 96 random bits from the OS, fresh for every seal
//! - Private keys, shared secrets and plaintext readings are never logged
//! - Any AEAD failure surfaces as `AuthenticationFailure` with no partial plaintext
//!
//! ## Protocol Flow
//!
//! 1. Device derives its keypair from its identifier
//! 2. Device obtains the collector's public key (see [`crate::cache`])
//! 3. Device agrees on the upstream sub-key as the initiator
//! 4. Device derives the session key for `(context, key_id)`
//! 5. Device seals the canonical reading under a random nonce
//! 6. Collector agrees as the responder against `devicePublicKey`, derives the same key and opens

pub mod ecdh;
pub mod encryption;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod key_store;

pub use ecdh::{agree, session_keys, AgreementKeyPair, Role, SessionKeys, SharedSecret};
pub use encryption::{decrypt_with_aead, encrypt_with_aead, generate_nonce, AeadCodec};
pub use envelope::{ClimateRecord, EncryptedEnvelope, SensorReading, WireEnvelope};
pub use error::{CryptoError, Result};
pub use identity::{derive_device_keypair, DeviceIdentity, ServerIdentity, ServerKeyPair};
pub use kdf::{derive_session_key, validate_context, SessionKey};
pub use key_store::{DeviceKeyring, FileKeyStore, KeyStore, MemoryKeyStore, StoredKeyPair};

/// X25519 public and private key length
pub const X25519_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 key length
pub const CHACHA20_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 IETF nonce length
pub const CHACHA20_NONCE_SIZE: usize = 12;

/// Poly1305 tag length appended to every ciphertext
pub const POLY1305_TAG_SIZE: usize = 16;

/// Longest accepted KDF context label, in bytes
pub const KDF_CONTEXT_MAX_LEN: usize = 8;

/// Context label used when none is configured
pub const DEFAULT_KDF_CONTEXT: &str = "climates";

/// Key id used when none is configured
pub const DEFAULT_KDF_KEY_ID: u64 = 1;

/// Version of the device key derivation scheme
///
/// Changing [`DEVICE_KEY_SALT`] or the hash changes every device key, so
/// such a change must bump this.
pub const DERIVATION_SCHEME_VERSION: u32 = 1;

/// Domain separator for device seed derivation
pub const DEVICE_KEY_SALT: &[u8] = b"sensor-envelope/device-key/v1";

/// HKDF salt for session key derivation
pub const KDF_SALT: &[u8] = b"sensor-envelope/session-key/v1";

/// Label prefixed to the device public key in the AEAD associated data
pub const AAD_LABEL: &[u8] = b"sensor-envelope/aad/v1";
