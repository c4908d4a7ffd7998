// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crypto Error Types
//!
//! Every failure raised by the envelope protocol maps onto one of these
//! variants. Errors from the underlying primitives (x25519, HKDF,
//! ChaCha20-Poly1305, base64, JSON) are converted here so callers can tell a
//! configuration mistake from genuine tampering.
//!
//! ## Error Variants
//!
//! - **InvalidIdentifier**: device identifier is empty or unusable
//! - **InvalidPeerKey**: remote public key has the wrong length or is a low-order point
//! - **InvalidContext**: KDF context label is empty or longer than 8 bytes
//! - **SerializationError**: reading or envelope cannot be canonically encoded/decoded
//! - **AuthenticationFailure**: AEAD tag did not verify (carries no detail)
//! - **DerivationError**: a key derivation primitive rejected its input
//! - **CacheFetchError**: the server public key could not be fetched
//! - **Storage**: the device keystore could not be read or written
//!
//! All variants are terminal for the operation that raised them. Nothing in
//! this crate retries internally.
//!
//! ## Usage Example
//!
//! ```rust
//! use sensor_envelope::crypto::CryptoError;
//!
//! fn check(id: &str) -> Result<(), CryptoError> {
//!     if id.is_empty() {
//!         return Err(CryptoError::InvalidIdentifier {
//!             reason: "device identifier is empty".to_string(),
//!         });
//!     }
//!     Ok(())
//! }
//! assert!(check("").is_err());
//! ```

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Error taxonomy for the sensor envelope protocol
///
/// `Clone` is required because a single in-flight server key fetch hands the
/// same outcome to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Device identifier rejected before derivation
    #[error("Invalid device identifier: {reason}")]
    InvalidIdentifier {
        /// Specific failure reason
        reason: String,
    },

    /// Remote public key is malformed
    ///
    /// This error occurs when:
    /// - Key has wrong length (X25519 keys are 32 bytes)
    /// - Key is not valid base64
    /// - Key is a low-order point (agreement would not be contributory)
    #[error("Invalid peer key ({key_type}): {reason}")]
    InvalidPeerKey {
        /// Which key failed (e.g. "server_public_key", "device_public_key")
        key_type: String,
        /// Specific failure reason
        reason: String,
    },

    /// KDF context label rejected
    #[error("Invalid KDF context '{context}': {reason}")]
    InvalidContext {
        /// The offending context label
        context: String,
        /// Specific failure reason
        reason: String,
    },

    /// Canonical encoding or decoding failed
    #[error("Serialization failed during {operation}: {reason}")]
    SerializationError {
        /// Which operation was being performed
        operation: String,
        /// Specific failure reason
        reason: String,
    },

    /// AEAD authentication failed
    ///
    /// Covers tampered ciphertext, tampered nonce, wrong key and mismatched
    /// associated data alike. Callers must discard the envelope.
    #[error("Authentication failed during {operation}")]
    AuthenticationFailure {
        /// Which operation was being performed
        operation: String,
    },

    /// Key derivation primitive rejected its input
    #[error("Key derivation failed during {operation}: {reason}")]
    DerivationError {
        /// Which derivation step failed
        operation: String,
        /// Specific failure reason
        reason: String,
    },

    /// Server public key fetch failed, timed out or was cancelled
    #[error("Server key fetch failed: {reason}")]
    CacheFetchError {
        /// Specific failure reason
        reason: String,
    },

    /// Device keystore I/O failed
    #[error("Key store {operation} failed: {reason}")]
    Storage {
        /// Which keystore operation failed
        operation: String,
        /// Specific failure reason
        reason: String,
    },
}

impl CryptoError {
    /// Short, stable name of the error kind (safe to log)
    pub fn kind(&self) -> &'static str {
        match self {
            CryptoError::InvalidIdentifier { .. } => "invalid_identifier",
            CryptoError::InvalidPeerKey { .. } => "invalid_peer_key",
            CryptoError::InvalidContext { .. } => "invalid_context",
            CryptoError::SerializationError { .. } => "serialization_error",
            CryptoError::AuthenticationFailure { .. } => "authentication_failure",
            CryptoError::DerivationError { .. } => "derivation_error",
            CryptoError::CacheFetchError { .. } => "cache_fetch_error",
            CryptoError::Storage { .. } => "storage_error",
        }
    }

    /// True when the envelope failed authentication and must be discarded
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, CryptoError::AuthenticationFailure { .. })
    }

    pub(crate) fn serialization(operation: &str, reason: impl ToString) -> Self {
        CryptoError::SerializationError {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn peer_key(key_type: &str, reason: impl ToString) -> Self {
        CryptoError::InvalidPeerKey {
            key_type: key_type.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn derivation(operation: &str, reason: impl ToString) -> Self {
        CryptoError::DerivationError {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn storage(operation: &str, reason: impl ToString) -> Self {
        CryptoError::Storage {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }
}

// Conversion from base64 decode errors
impl From<base64::DecodeError> for CryptoError {
    fn from(err: base64::DecodeError) -> Self {
        CryptoError::serialization("base64_decode", err)
    }
}

// Conversion from JSON errors
impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        CryptoError::serialization("json", err)
    }
}

// The aead error is opaque; it only ever means the tag did not verify
impl From<chacha20poly1305::aead::Error> for CryptoError {
    fn from(_: chacha20poly1305::aead::Error) -> Self {
        CryptoError::AuthenticationFailure {
            operation: "AEAD".to_string(),
        }
    }
}

// Conversion from HKDF output length errors
impl From<hkdf::InvalidLength> for CryptoError {
    fn from(err: hkdf::InvalidLength) -> Self {
        CryptoError::derivation("hkdf_expand", err)
    }
}
