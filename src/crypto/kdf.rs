// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session Key Derivation
//!
//! Expands an agreed [`SharedSecret`] into the 32-byte ChaCha20-Poly1305 key
//! with HKDF-SHA256. The context label and the numeric key id are both bound
//! into the HKDF `info`, so different contexts (or ids) give unrelated keys
//! from the same secret.
//!
//! ```text
//! prk = HKDF-Extract(salt = KDF_SALT, ikm = shared_secret)
//! key = HKDF-Expand(prk, info = context || key_id (u64 LE), 32)
//! ```
//!
//! Context labels are compact identifiers of at most
//! [`KDF_CONTEXT_MAX_LEN`](super::KDF_CONTEXT_MAX_LEN) bytes. Longer labels
//! are rejected, never truncated. Since `key_id` is a fixed-width suffix the
//! `info` encoding is unambiguous.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::ecdh::SharedSecret;
use super::error::{CryptoError, Result};
use super::{CHACHA20_KEY_SIZE, KDF_CONTEXT_MAX_LEN, KDF_SALT};

/// 256-bit symmetric key for one AEAD operation
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; CHACHA20_KEY_SIZE]);

impl SessionKey {
    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; CHACHA20_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

/// Check a context label against the KDF's limits
pub fn validate_context(context: &str) -> Result<()> {
    if context.is_empty() {
        return Err(CryptoError::InvalidContext {
            context: context.to_string(),
            reason: "context must not be empty".to_string(),
        });
    }
    if context.len() > KDF_CONTEXT_MAX_LEN {
        return Err(CryptoError::InvalidContext {
            context: context.to_string(),
            reason: format!(
                "context must be at most {} bytes, got {}",
                KDF_CONTEXT_MAX_LEN,
                context.len()
            ),
        });
    }
    Ok(())
}

/// Derive the session key for `(secret, context, key_id)`
///
/// # Errors
///
/// - `InvalidContext` if `context` is empty or longer than 8 bytes
/// - `DerivationError` if HKDF rejects the output length
pub fn derive_session_key(secret: &SharedSecret, context: &str, key_id: u64) -> Result<SessionKey> {
    validate_context(context)?;

    let mut info = Vec::with_capacity(context.len() + 8);
    info.extend_from_slice(context.as_bytes());
    info.extend_from_slice(&key_id.to_le_bytes());

    let hkdf = Hkdf::<Sha256>::new(Some(KDF_SALT), secret.as_bytes());
    let mut okm = [0u8; CHACHA20_KEY_SIZE];
    hkdf.expand(&info, &mut okm)?;

    let key = SessionKey(okm);
    okm.zeroize();
    Ok(key)
}
