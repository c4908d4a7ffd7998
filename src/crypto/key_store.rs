// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Device Key Storage
//!
//! Persists device keypairs as `{ publicKey, privateKey }` (base64) and keeps
//! an in-process memo so a device derives its keypair at most once per run.
//!
//! Storage is a cache of the derivation, never the other way round: a stored
//! pair that disagrees with the derived one is overwritten. A store that
//! cannot be read or written only produces a warning, so a device with a
//! broken disk keeps encrypting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::{CryptoError, Result};
use super::identity::{derive_device_keypair, DeviceIdentity};

/// Persisted keypair (both halves standard base64)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct StoredKeyPair {
    /// Base64 X25519 public key
    pub public_key: String,
    /// Base64 X25519 private key
    pub private_key: String,
}

impl std::fmt::Debug for StoredKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Backend that persists device keypairs by device identifier
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Load the stored pair for `device_id`, if any
    async fn load(&self, device_id: &str) -> Result<Option<StoredKeyPair>>;

    /// Store (or replace) the pair for `device_id`
    async fn save(&self, device_id: &str, pair: &StoredKeyPair) -> Result<()>;

    /// Remove the pair for `device_id`; missing entries are not an error
    async fn remove(&self, device_id: &str) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Process-local key store
///
/// Nothing survives a restart. Useful for tests and for collectors that only
/// ever need derived keys.
#[derive(Default)]
pub struct MemoryKeyStore {
    pairs: RwLock<HashMap<String, StoredKeyPair>>,
}

impl MemoryKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored pairs
    pub async fn count(&self) -> usize {
        self.pairs.read().await.len()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn load(&self, device_id: &str) -> Result<Option<StoredKeyPair>> {
        Ok(self.pairs.read().await.get(device_id).cloned())
    }

    async fn save(&self, device_id: &str, pair: &StoredKeyPair) -> Result<()> {
        self.pairs
            .write()
            .await
            .insert(device_id.to_string(), pair.clone());
        Ok(())
    }

    async fn remove(&self, device_id: &str) -> Result<()> {
        self.pairs.write().await.remove(device_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// JSON file key store
///
/// The whole file is one object mapping device id to stored pair. Writes go
/// to a sibling temp file which is then renamed over the original, so a crash
/// mid-write leaves the previous contents intact.
pub struct FileKeyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyStore {
    /// Use `path` as the backing file; it is created on first save
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backing file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<HashMap<String, StoredKeyPair>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(CryptoError::storage("read", e)),
        };
        if raw.is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_slice(&raw).map_err(|e| CryptoError::storage("parse", e))
    }

    async fn write_all(&self, pairs: &HashMap<String, StoredKeyPair>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CryptoError::storage("create_dir", e))?;
            }
        }

        let mut body =
            serde_json::to_vec_pretty(pairs).map_err(|e| CryptoError::storage("encode", e))?;
        let tmp = self.path.with_extension("tmp");
        let written = tokio::fs::write(&tmp, &body).await;
        body.zeroize();
        written.map_err(|e| CryptoError::storage("write", e))?;

        // Private keys: owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| CryptoError::storage("chmod", e))?;
        }

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| CryptoError::storage("rename", e))
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn load(&self, device_id: &str) -> Result<Option<StoredKeyPair>> {
        let mut pairs = self.read_all().await?;
        Ok(pairs.remove(device_id))
    }

    async fn save(&self, device_id: &str, pair: &StoredKeyPair) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut pairs = self.read_all().await?;
        pairs.insert(device_id.to_string(), pair.clone());
        self.write_all(&pairs).await
    }

    async fn remove(&self, device_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut pairs = self.read_all().await?;
        if pairs.remove(device_id).is_some() {
            self.write_all(&pairs).await?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Resolves device identities through a memo, a key store and derivation
///
/// # Example
///
/// ```ignore
/// let keyring = DeviceKeyring::new(Arc::new(MemoryKeyStore::new()));
/// let identity = keyring.load_or_derive("sensor-001").await?;
/// ```
#[derive(Clone)]
pub struct DeviceKeyring {
    store: Arc<dyn KeyStore>,
    memo: Arc<RwLock<HashMap<String, DeviceIdentity>>>,
}

impl DeviceKeyring {
    /// Create a keyring over `store`
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            memo: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Return the identity for `device_id`
    ///
    /// Order of resolution:
    /// 1. in-process memo
    /// 2. derive, then compare with the stored pair
    /// 3. persist the derived pair when the store is empty or disagrees
    ///
    /// # Errors
    ///
    /// Only `InvalidIdentifier` and `DerivationError` from derivation itself.
    pub async fn load_or_derive(&self, device_id: &str) -> Result<DeviceIdentity> {
        if let Some(identity) = self.memo.read().await.get(device_id) {
            return Ok(identity.clone());
        }

        let derived = derive_device_keypair(device_id)?;

        match self.store.load(device_id).await {
            Ok(Some(stored)) => match DeviceIdentity::from_stored(device_id, &stored) {
                Ok(existing) if existing == derived => {
                    debug!(device_id, store = self.store.name(), "stored keypair matches derivation");
                }
                Ok(_) => {
                    warn!(
                        device_id,
                        store = self.store.name(),
                        "stored keypair differs from derived keypair, replacing"
                    );
                    self.persist(&derived).await;
                }
                Err(e) => {
                    warn!(
                        device_id,
                        error = %e.kind(),
                        "stored keypair is unreadable, replacing"
                    );
                    self.persist(&derived).await;
                }
            },
            Ok(None) => {
                info!(device_id, store = self.store.name(), "🔑 persisting new device keypair");
                self.persist(&derived).await;
            }
            Err(e) => {
                warn!(device_id, error = %e, "key store unavailable, using derived keypair");
            }
        }

        self.memo
            .write()
            .await
            .insert(device_id.to_string(), derived.clone());
        Ok(derived)
    }

    /// Drop the memoised and stored pair for `device_id`
    pub async fn forget(&self, device_id: &str) -> Result<()> {
        self.memo.write().await.remove(device_id);
        self.store.remove(device_id).await
    }

    async fn persist(&self, identity: &DeviceIdentity) {
        if let Err(e) = self
            .store
            .save(identity.device_id(), &identity.to_stored())
            .await
        {
            warn!(device_id = identity.device_id(), error = %e, "failed to persist device keypair");
        }
    }
}

impl std::fmt::Debug for DeviceKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKeyring")
            .field("store", &self.store.name())
            .finish()
    }
}
