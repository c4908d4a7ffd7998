// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Device and collector channels
//!
//! Thin facades over the crypto primitives that fix the role each side plays:
//! a [`DeviceChannel`] always agrees as the initiator, a [`CollectorChannel`]
//! always as the responder. Both end up on the same upstream key, so either
//! side can seal and the other can open.

use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{EnvelopeCache, HttpServerKeySource};
use crate::config::ProtocolConfig;
use crate::crypto::{
    agree, derive_session_key, validate_context, AeadCodec, AgreementKeyPair, ClimateRecord,
    DeviceKeyring, EncryptedEnvelope, FileKeyStore, KeyStore, MemoryKeyStore, Result, Role,
    SensorReading, ServerIdentity, ServerKeyPair, SessionKey, WireEnvelope,
};

/// Session key parameters both sides must share
#[derive(Debug, Clone)]
struct KeySchedule {
    context: String,
    key_id: u64,
    codec: AeadCodec,
}

impl KeySchedule {
    fn from_config(config: &ProtocolConfig) -> Result<Self> {
        validate_context(&config.kdf_context)?;
        Ok(Self {
            context: config.kdf_context.clone(),
            key_id: config.kdf_key_id,
            codec: config.codec(),
        })
    }

    fn session_key<K: AgreementKeyPair>(
        &self,
        local: &K,
        remote_public_key: &[u8],
        role: Role,
    ) -> Result<SessionKey> {
        let secret = agree(local, remote_public_key, role)?;
        derive_session_key(&secret, &self.context, self.key_id)
    }
}

/// Device side: seals readings for the collector
#[derive(Debug, Clone)]
pub struct DeviceChannel {
    schedule: KeySchedule,
    cache: Arc<EnvelopeCache>,
    keyring: DeviceKeyring,
}

impl DeviceChannel {
    /// Create a channel from explicit parts
    pub fn new(
        config: &ProtocolConfig,
        cache: Arc<EnvelopeCache>,
        keyring: DeviceKeyring,
    ) -> Result<Self> {
        Ok(Self {
            schedule: KeySchedule::from_config(config)?,
            cache,
            keyring,
        })
    }

    /// Create a channel that fetches the server key over HTTP
    ///
    /// Device keys are kept in `config.keystore_path` when set, in memory
    /// otherwise.
    pub fn from_config(config: &ProtocolConfig) -> Result<Self> {
        let source = HttpServerKeySource::new(&config.key_endpoint, config.key_fetch_timeout())?;
        let cache = Arc::new(EnvelopeCache::new(
            Arc::new(source),
            config.key_fetch_timeout(),
        ));

        let store: Arc<dyn KeyStore> = match &config.keystore_path {
            Some(path) => Arc::new(FileKeyStore::new(path.clone())),
            None => Arc::new(MemoryKeyStore::new()),
        };
        info!(store = store.name(), endpoint = %config.key_endpoint, "device channel ready");

        Self::new(config, cache, DeviceKeyring::new(store))
    }

    /// Server key cache used by this channel
    pub fn cache(&self) -> &Arc<EnvelopeCache> {
        &self.cache
    }

    /// Base64 public key of `device_id`, as registered with the collector
    pub async fn device_public_key(&self, device_id: &str) -> Result<String> {
        let identity = self.keyring.load_or_derive(device_id).await?;
        Ok(identity.public_key_base64())
    }

    async fn upstream_key(&self, device_id: &str) -> Result<(SessionKey, [u8; 32])> {
        let identity = self.keyring.load_or_derive(device_id).await?;
        let server: ServerIdentity = self.cache.get_server_public_key().await?;
        let key = self
            .schedule
            .session_key(&identity, server.public_key(), Role::Initiator)?;
        Ok((key, identity.public_key_bytes()))
    }

    /// Seal a reading from `device_id`
    pub async fn seal(&self, reading: &SensorReading, device_id: &str) -> Result<WireEnvelope> {
        let (key, device_public_key) = self.upstream_key(device_id).await?;
        let envelope = self.schedule.codec.seal(reading, &key, device_public_key)?;
        debug!(device_id, "reading sealed for collector");
        Ok(WireEnvelope::from(envelope))
    }

    /// Open an envelope sealed under `device_id`'s upstream key
    ///
    /// Works for envelopes the device sealed itself and for envelopes the
    /// collector addressed to it. The two are indistinguishable, see
    /// [`CollectorChannel::seal_for_device`].
    pub async fn open(&self, wire: &WireEnvelope, device_id: &str) -> Result<SensorReading> {
        let envelope = EncryptedEnvelope::try_from(wire)?;
        let (key, _) = self.upstream_key(device_id).await?;
        self.schedule.codec.open(&envelope, &key)
    }
}

/// Collector side: opens envelopes from any device
#[derive(Debug, Clone)]
pub struct CollectorChannel {
    schedule: KeySchedule,
    keypair: ServerKeyPair,
}

impl CollectorChannel {
    /// Create a collector holding `keypair`
    pub fn new(keypair: ServerKeyPair, config: &ProtocolConfig) -> Result<Self> {
        Ok(Self {
            schedule: KeySchedule::from_config(config)?,
            keypair,
        })
    }

    /// Public key to distribute to devices
    pub fn public_identity(&self) -> ServerIdentity {
        self.keypair.public_identity()
    }

    /// Open an envelope, agreeing against the device key it carries
    ///
    /// # Errors
    ///
    /// - `InvalidPeerKey` if `devicePublicKey` is malformed
    /// - `AuthenticationFailure` if the envelope was tampered with or sealed
    ///   for another collector or context
    pub async fn open(&self, wire: &WireEnvelope) -> Result<SensorReading> {
        let envelope = EncryptedEnvelope::try_from(wire)?;
        let key = self.schedule.session_key(
            &self.keypair,
            &envelope.device_public_key,
            Role::Responder,
        )?;
        let reading = self.schedule.codec.open(&envelope, &key)?;
        debug!(
            device_public_key = %wire.device_public_key,
            "opened device envelope"
        );
        Ok(reading)
    }

    /// Open a stored ingestion record
    ///
    /// `device_public_key` (base64) is used when the record does not carry one.
    pub async fn open_record(
        &self,
        record: &ClimateRecord,
        device_public_key: &str,
    ) -> Result<SensorReading> {
        self.open(&record.envelope(device_public_key)).await
    }

    /// Seal a reading addressed to the device owning `device_public_key`
    ///
    /// Downstream envelopes use the upstream key and the same associated
    /// data, so they carry no direction. An envelope the device sealed
    /// itself, replayed back to it, opens on the device exactly like one from
    /// the collector. Devices must not treat a successful
    /// [`DeviceChannel::open`] as proof that the collector sent it.
    pub fn seal_for_device(
        &self,
        reading: &SensorReading,
        device_public_key: &[u8],
    ) -> Result<WireEnvelope> {
        let key = self
            .schedule
            .session_key(&self.keypair, device_public_key, Role::Responder)?;
        // agree() already rejected anything that is not 32 bytes
        let mut device_key = [0u8; 32];
        device_key.copy_from_slice(device_public_key);

        let envelope = self.schedule.codec.seal(reading, &key, device_key)?;
        Ok(WireEnvelope::from(envelope))
    }
}
