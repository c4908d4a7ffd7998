// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ChaCha20-Poly1305 Encryption/Decryption
//!
//! Implements authenticated encryption using ChaCha20-Poly1305 in its IETF
//! variant (12-byte nonce), plus the [`AeadCodec`] that frames a
//! [`SensorReading`] into an [`EncryptedEnvelope`] and back.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, warn};

use super::envelope::{EncryptedEnvelope, SensorReading};
use super::error::{CryptoError, Result};
use super::kdf::SessionKey;
use super::{AAD_LABEL, CHACHA20_KEY_SIZE, CHACHA20_NONCE_SIZE, X25519_KEY_SIZE};

/// Generate a fresh 12-byte nonce from the OS random source
pub fn generate_nonce() -> [u8; CHACHA20_NONCE_SIZE] {
    let mut nonce = [0u8; CHACHA20_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt data using ChaCha20-Poly1305 AEAD
///
/// # Arguments
///
/// * `plaintext` - Data to encrypt
/// * `nonce` - 12-byte nonce (must be unique for this key)
/// * `aad` - Additional authenticated data (can be empty)
/// * `key` - 32-byte encryption key
///
/// # Returns
///
/// Encrypted ciphertext with the 16-byte authentication tag appended
pub fn encrypt_with_aead(
    plaintext: &[u8],
    nonce: &[u8],
    aad: &[u8],
    key: &[u8],
) -> Result<Vec<u8>> {
    let cipher = build_cipher(nonce, key, "encrypt")?;

    let payload = Payload {
        msg: plaintext,
        aad,
    };

    cipher
        .encrypt(Nonce::from_slice(nonce), payload)
        .map_err(|_| CryptoError::serialization("encrypt", "plaintext too large for AEAD"))
}

/// Decrypt data using ChaCha20-Poly1305 AEAD
///
/// # Errors
///
/// `AuthenticationFailure` for any tag mismatch (tampered data, wrong key,
/// wrong nonce or wrong AAD). No plaintext is ever returned in that case.
pub fn decrypt_with_aead(
    ciphertext: &[u8],
    nonce: &[u8],
    aad: &[u8],
    key: &[u8],
) -> Result<Vec<u8>> {
    let cipher = build_cipher(nonce, key, "decrypt")?;

    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    cipher
        .decrypt(Nonce::from_slice(nonce), payload)
        .map_err(|_| CryptoError::AuthenticationFailure {
            operation: "decrypt".to_string(),
        })
}

fn build_cipher(nonce: &[u8], key: &[u8], operation: &str) -> Result<ChaCha20Poly1305> {
    if nonce.len() != CHACHA20_NONCE_SIZE {
        return Err(CryptoError::serialization(
            operation,
            format!(
                "invalid nonce size: expected {} bytes, got {}",
                CHACHA20_NONCE_SIZE,
                nonce.len()
            ),
        ));
    }

    if key.len() != CHACHA20_KEY_SIZE {
        return Err(CryptoError::derivation(
            operation,
            format!(
                "invalid key size: expected {} bytes, got {}",
                CHACHA20_KEY_SIZE,
                key.len()
            ),
        ));
    }

    ChaCha20Poly1305::new_from_slice(key).map_err(|e| CryptoError::derivation(operation, e))
}

/// Frames readings into envelopes
///
/// With `bind_device_key` set (the default) the associated data is
/// `AAD_LABEL || device_public_key`. With it cleared no associated data is
/// used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AeadCodec {
    bind_device_key: bool,
}

impl Default for AeadCodec {
    fn default() -> Self {
        Self {
            bind_device_key: true,
        }
    }
}

impl AeadCodec {
    /// Create a codec with an explicit associated-data policy
    pub fn new(bind_device_key: bool) -> Self {
        Self { bind_device_key }
    }

    /// Whether the device public key is bound into the tag
    pub fn binds_device_key(&self) -> bool {
        self.bind_device_key
    }

    fn associated_data(&self, device_public_key: &[u8; X25519_KEY_SIZE]) -> Vec<u8> {
        if !self.bind_device_key {
            return Vec::new();
        }
        let mut aad = Vec::with_capacity(AAD_LABEL.len() + X25519_KEY_SIZE);
        aad.extend_from_slice(AAD_LABEL);
        aad.extend_from_slice(device_public_key);
        aad
    }

    /// Encrypt a reading under `key` with a fresh random nonce
    ///
    /// # Errors
    ///
    /// `SerializationError` if the reading has no canonical form (NaN or
    /// infinite values).
    pub fn seal(
        &self,
        reading: &SensorReading,
        key: &SessionKey,
        device_public_key: [u8; X25519_KEY_SIZE],
    ) -> Result<EncryptedEnvelope> {
        let plaintext = reading.to_canonical_bytes()?;
        let nonce = generate_nonce();
        let aad = self.associated_data(&device_public_key);

        let ciphertext = encrypt_with_aead(&plaintext, &nonce, &aad, key.as_bytes())?;

        debug!(
            ciphertext_len = ciphertext.len(),
            bound = self.bind_device_key,
            "sealed sensor reading"
        );

        Ok(EncryptedEnvelope {
            ciphertext,
            nonce,
            device_public_key,
        })
    }

    /// Decrypt and decode an envelope under `key`
    ///
    /// # Errors
    ///
    /// - `AuthenticationFailure` if the tag does not verify
    /// - `SerializationError` if the authenticated plaintext is not a reading
    pub fn open(&self, envelope: &EncryptedEnvelope, key: &SessionKey) -> Result<SensorReading> {
        let aad = self.associated_data(&envelope.device_public_key);

        let plaintext = decrypt_with_aead(
            &envelope.ciphertext,
            &envelope.nonce,
            &aad,
            key.as_bytes(),
        )
        .map_err(|e| {
            if e.is_authentication_failure() {
                warn!("envelope failed authentication, discarding");
                CryptoError::AuthenticationFailure {
                    operation: "open".to_string(),
                }
            } else {
                e
            }
        })?;

        SensorReading::from_canonical_bytes(&plaintext)
    }
}
