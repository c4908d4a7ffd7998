// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! X25519 Key Agreement
//!
//! Performs Diffie-Hellman between a local static keypair and a peer's
//! public key, then splits the result into a receive and a transmit sub-key
//! the way a kx exchange does:
//!
//! ```text
//! q        = X25519(local_secret, remote_public)
//! h        = SHA-512(q || initiator_public || responder_public)
//! initiator: rx = h[0..32],  tx = h[32..64]
//! responder: tx = h[0..32],  rx = h[32..64]
//! ```
//!
//! The upstream channel (device → collector) uses the initiator's transmit
//! key, which is the responder's receive key. [`agree`] returns exactly that
//! key for either role, so both sides converge without coordination.

use sha2::{Digest, Sha512};
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::{CryptoError, Result};
use super::identity::{DeviceIdentity, ServerKeyPair};
use super::X25519_KEY_SIZE;

/// Which side of the exchange the local keypair plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The device (client) side
    Initiator,
    /// The collector (server) side
    Responder,
}

/// A static X25519 keypair that can take part in key agreement
pub trait AgreementKeyPair {
    /// Local secret scalar
    fn agreement_secret(&self) -> &StaticSecret;

    /// Local public key bytes
    fn agreement_public(&self) -> [u8; X25519_KEY_SIZE];
}

impl AgreementKeyPair for DeviceIdentity {
    fn agreement_secret(&self) -> &StaticSecret {
        self.secret()
    }

    fn agreement_public(&self) -> [u8; X25519_KEY_SIZE] {
        self.public_key_bytes()
    }
}

impl AgreementKeyPair for ServerKeyPair {
    fn agreement_secret(&self) -> &StaticSecret {
        self.secret()
    }

    fn agreement_public(&self) -> [u8; X25519_KEY_SIZE] {
        self.public().to_bytes()
    }
}

/// 32 bytes of key material produced by one agreement
///
/// Ephemeral: recomputed per operation, never persisted or transmitted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Create a shared secret from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw secret bytes
    ///
    /// Treat as sensitive; prefer passing the secret straight into
    /// [`derive_session_key`](super::kdf::derive_session_key).
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

/// Both directional sub-keys from one agreement
#[derive(Debug, Clone)]
pub struct SessionKeys {
    /// Key for traffic the local side receives
    pub rx: SharedSecret,
    /// Key for traffic the local side transmits
    pub tx: SharedSecret,
}

/// Compute both directional sub-keys for the local side
///
/// # Errors
///
/// `InvalidPeerKey` when the remote key is not 32 bytes, or when it is a
/// low-order point that would make the shared value independent of the
/// local secret.
pub fn session_keys<K: AgreementKeyPair>(
    local: &K,
    remote_public_key: &[u8],
    role: Role,
) -> Result<SessionKeys> {
    let remote: [u8; X25519_KEY_SIZE] = remote_public_key.try_into().map_err(|_| {
        CryptoError::peer_key(
            "remote_public_key",
            format!(
                "expected {} bytes, got {}",
                X25519_KEY_SIZE,
                remote_public_key.len()
            ),
        )
    })?;
    let remote_point = PublicKey::from(remote);

    let shared = local.agreement_secret().diffie_hellman(&remote_point);
    if !shared.was_contributory() {
        return Err(CryptoError::peer_key(
            "remote_public_key",
            "low-order point, key agreement is not contributory",
        ));
    }

    let local_public = local.agreement_public();
    let (initiator_pk, responder_pk) = match role {
        Role::Initiator => (local_public, remote),
        Role::Responder => (remote, local_public),
    };

    let mut hasher = Sha512::new();
    hasher.update(shared.as_bytes());
    hasher.update(initiator_pk);
    hasher.update(responder_pk);
    let mut digest = hasher.finalize();

    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&digest[..32]);
    second.copy_from_slice(&digest[32..]);
    digest.as_mut_slice().zeroize();

    let keys = match role {
        Role::Initiator => SessionKeys {
            rx: SharedSecret(first),
            tx: SharedSecret(second),
        },
        Role::Responder => SessionKeys {
            tx: SharedSecret(first),
            rx: SharedSecret(second),
        },
    };
    first.zeroize();
    second.zeroize();

    debug!(
        ?role,
        local_public = %hex::encode(local_public),
        remote_public = %hex::encode(remote),
        "key agreement complete"
    );

    Ok(keys)
}

/// Agree on the upstream (device → collector) shared secret
///
/// `role` selects the sub-key: the initiator takes its transmit key, the
/// responder takes its receive key. Both are the same bytes.
///
/// # Example
///
/// ```
/// use sensor_envelope::crypto::{agree, derive_device_keypair, Role, ServerKeyPair};
///
/// let device = derive_device_keypair("sensor-001").unwrap();
/// let server = ServerKeyPair::generate();
///
/// let on_device = agree(&device, server.public_identity().public_key(), Role::Initiator).unwrap();
/// let on_server = agree(&server, &device.public_key_bytes(), Role::Responder).unwrap();
/// assert_eq!(on_device.as_bytes(), on_server.as_bytes());
/// ```
pub fn agree<K: AgreementKeyPair>(
    local: &K,
    remote_public_key: &[u8],
    role: Role,
) -> Result<SharedSecret> {
    let keys = session_keys(local, remote_public_key, role)?;
    Ok(match role {
        Role::Initiator => keys.tx,
        Role::Responder => keys.rx,
    })
}
