// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Device and Server Identities
//!
//! A device's long-term X25519 keypair is derived deterministically from its
//! identifier, so a device that loses local storage recovers the same keys
//! without any enrollment round trip.
//!
//! ## Derivation Scheme (version 1)
//!
//! ```text
//! seed       = SHA-256(DEVICE_KEY_SALT || device_id)
//! privateKey = X25519 static secret from seed (clamped by the curve library)
//! publicKey  = X25519(privateKey, basepoint)
//! ```
//!
//! ## Security Considerations
//!
//! - Anyone who knows (or guesses) a device identifier can recompute its
//!   private key. Identifiers must therefore be high-entropy (e.g. UUIDs), or
//!   the keystore must be the source of truth and derivation disabled.
//! - Private key bytes are never logged; `Debug` output is redacted.
//! - Secrets are zeroized on drop.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::error::{CryptoError, Result};
use super::key_store::StoredKeyPair;
use super::{DEVICE_KEY_SALT, DERIVATION_SCHEME_VERSION, X25519_KEY_SIZE};

/// A device's long-term keypair, bound to its identifier
#[derive(Clone)]
pub struct DeviceIdentity {
    device_id: String,
    secret: StaticSecret,
    public: PublicKey,
}

impl DeviceIdentity {
    /// Device identifier this keypair was derived for
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Raw 32-byte public key
    pub fn public_key_bytes(&self) -> [u8; X25519_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Raw 32-byte private key, wiped when the returned buffer drops
    ///
    /// Only the keystore should call this; the value must never reach a log
    /// or an envelope.
    pub fn private_key_bytes(&self) -> Zeroizing<[u8; X25519_KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Public key as standard base64 (wire format)
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.public.as_bytes())
    }

    /// Rebuild an identity from its persisted form
    ///
    /// Fails with `DerivationError` if either key is malformed or the stored
    /// public key does not belong to the stored private key.
    pub fn from_stored(device_id: &str, stored: &StoredKeyPair) -> Result<Self> {
        validate_device_id(device_id)?;

        let private = Zeroizing::new(BASE64.decode(stored.private_key.as_bytes())?);
        let private: [u8; X25519_KEY_SIZE] = private.as_slice().try_into().map_err(|_| {
            CryptoError::derivation(
                "load_private_key",
                format!(
                    "expected {} bytes, got {}",
                    X25519_KEY_SIZE,
                    private.len()
                ),
            )
        })?;
        let private = Zeroizing::new(private);

        let public = BASE64.decode(stored.public_key.as_bytes())?;
        let public: [u8; X25519_KEY_SIZE] = public.as_slice().try_into().map_err(|_| {
            CryptoError::derivation(
                "load_public_key",
                format!("expected {} bytes, got {}", X25519_KEY_SIZE, public.len()),
            )
        })?;

        let secret = StaticSecret::from(*private);
        let expected = PublicKey::from(&secret);
        if expected.as_bytes() != &public {
            return Err(CryptoError::derivation(
                "load_keypair",
                "stored public key does not match stored private key",
            ));
        }

        Ok(Self {
            device_id: device_id.to_string(),
            secret,
            public: expected,
        })
    }

    /// Persisted form `{ publicKey, privateKey }` (base64)
    pub fn to_stored(&self) -> StoredKeyPair {
        let private = self.private_key_bytes();
        StoredKeyPair {
            public_key: self.public_key_base64(),
            private_key: BASE64.encode(private.as_slice()),
        }
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl PartialEq for DeviceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.device_id == other.device_id
            && self.public.as_bytes() == other.public.as_bytes()
            && *self.private_key_bytes() == *other.private_key_bytes()
    }
}

impl Eq for DeviceIdentity {}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("device_id", &self.device_id)
            .field("public_key", &hex::encode(self.public.as_bytes()))
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Derive a device's long-term keypair from its identifier
///
/// Pure function: the same `device_id` always yields a bit-identical keypair
/// under the same derivation scheme version.
///
/// # Errors
///
/// - `InvalidIdentifier` if `device_id` is empty or only whitespace
/// - `DerivationError` if the hash output cannot be used as a seed
///
/// # Example
///
/// ```
/// use sensor_envelope::crypto::derive_device_keypair;
///
/// let a = derive_device_keypair("dev-42").unwrap();
/// let b = derive_device_keypair("dev-42").unwrap();
/// assert_eq!(a.public_key_bytes(), b.public_key_bytes());
/// ```
pub fn derive_device_keypair(device_id: &str) -> Result<DeviceIdentity> {
    validate_device_id(device_id)?;

    let mut hasher = Sha256::new();
    hasher.update(DEVICE_KEY_SALT);
    hasher.update(device_id.as_bytes());
    let digest = Zeroizing::new(hasher.finalize().to_vec());

    let seed: [u8; X25519_KEY_SIZE] = digest.as_slice().try_into().map_err(|_| {
        CryptoError::derivation(
            "device_seed",
            format!(
                "seed must be {} bytes, got {}",
                X25519_KEY_SIZE,
                digest.len()
            ),
        )
    })?;
    let seed = Zeroizing::new(seed);

    let secret = StaticSecret::from(*seed);
    let public = PublicKey::from(&secret);

    debug!(
        device_id,
        scheme = DERIVATION_SCHEME_VERSION,
        public_key = %hex::encode(public.as_bytes()),
        "derived device keypair"
    );

    Ok(DeviceIdentity {
        device_id: device_id.to_string(),
        secret,
        public,
    })
}

fn validate_device_id(device_id: &str) -> Result<()> {
    if device_id.trim().is_empty() {
        return Err(CryptoError::InvalidIdentifier {
            reason: "device identifier is empty".to_string(),
        });
    }
    Ok(())
}

/// The collector's public key as seen by devices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerIdentity {
    public_key: [u8; X25519_KEY_SIZE],
}

impl ServerIdentity {
    /// Wrap a raw public key, rejecting anything that is not 32 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let public_key: [u8; X25519_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::peer_key(
                "server_public_key",
                format!("expected {} bytes, got {}", X25519_KEY_SIZE, bytes.len()),
            )
        })?;
        Ok(Self { public_key })
    }

    /// Parse the key-distribution endpoint's base64 value
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim().as_bytes())
            .map_err(|e| CryptoError::peer_key("server_public_key", format!("invalid base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Raw 32-byte public key
    pub fn public_key(&self) -> &[u8; X25519_KEY_SIZE] {
        &self.public_key
    }

    /// Public key as standard base64
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.public_key)
    }
}

/// The collector's long-term keypair
///
/// Generated once on the server and kept there; devices only ever see the
/// matching [`ServerIdentity`].
#[derive(Clone)]
pub struct ServerKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl ServerKeyPair {
    /// Generate a fresh keypair from the OS random source
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Load a keypair from its 32-byte private key
    pub fn from_bytes(private_key: &[u8]) -> Result<Self> {
        let bytes: [u8; X25519_KEY_SIZE] = private_key.try_into().map_err(|_| {
            CryptoError::derivation(
                "server_private_key",
                format!(
                    "expected {} bytes, got {}",
                    X25519_KEY_SIZE,
                    private_key.len()
                ),
            )
        })?;
        let bytes = Zeroizing::new(bytes);
        let secret = StaticSecret::from(*bytes);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    /// Load a keypair from a base64-encoded private key
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(BASE64.decode(encoded.trim().as_bytes())?);
        Self::from_bytes(&bytes)
    }

    /// Public half, suitable for distribution to devices
    pub fn public_identity(&self) -> ServerIdentity {
        ServerIdentity {
            public_key: self.public.to_bytes(),
        }
    }

    /// Raw 32-byte private key, wiped when the returned buffer drops
    pub fn private_key_bytes(&self) -> Zeroizing<[u8; X25519_KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    pub(crate) fn public(&self) -> &PublicKey {
        &self.public
    }
}

impl std::fmt::Debug for ServerKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKeyPair")
            .field("public_key", &hex::encode(self.public.as_bytes()))
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}
