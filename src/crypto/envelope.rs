// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Envelope and Reading Types
//!
//! Plaintext readings, the binary envelope produced by the AEAD codec, and
//! the base64 wire forms that travel to the ingestion endpoint.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{CryptoError, Result};
use super::{CHACHA20_NONCE_SIZE, X25519_KEY_SIZE};

/// A single temperature/humidity sample
///
/// Canonical byte form is compact JSON with fields in declaration order:
/// `{"temperature":23.5,"humidity":55.0}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorReading {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity, percent
    pub humidity: f64,
}

impl SensorReading {
    /// Create a reading, rejecting NaN and infinities
    pub fn new(temperature: f64, humidity: f64) -> Result<Self> {
        let reading = Self {
            temperature,
            humidity,
        };
        reading.validate()?;
        Ok(reading)
    }

    /// Non-finite values have no canonical JSON form
    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || !self.humidity.is_finite() {
            return Err(CryptoError::serialization(
                "encode_reading",
                "temperature and humidity must be finite numbers",
            ));
        }
        Ok(())
    }

    /// Canonical byte form fed to the AEAD
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;
        serde_json::to_vec(self).map_err(|e| CryptoError::serialization("encode_reading", e))
    }

    /// Exact inverse of [`to_canonical_bytes`](Self::to_canonical_bytes)
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self> {
        let reading: SensorReading = serde_json::from_slice(bytes)
            .map_err(|e| CryptoError::serialization("decode_reading", e))?;
        reading
            .validate()
            .map_err(|_| CryptoError::serialization("decode_reading", "non-finite value"))?;
        Ok(reading)
    }
}

/// Binary envelope: ciphertext (with 16-byte tag), nonce and sender key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    /// ChaCha20-Poly1305 output, tag appended
    pub ciphertext: Vec<u8>,
    /// 12-byte IETF nonce, unique per key
    pub nonce: [u8; CHACHA20_NONCE_SIZE],
    /// Device public key the collector agrees against
    pub device_public_key: [u8; X25519_KEY_SIZE],
}

/// Envelope as sent over the network (standard base64, camelCase JSON)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    /// Base64 ciphertext
    pub ciphertext: String,
    /// Base64 12-byte nonce
    pub nonce: String,
    /// Base64 32-byte device public key
    pub device_public_key: String,
}

impl From<&EncryptedEnvelope> for WireEnvelope {
    fn from(envelope: &EncryptedEnvelope) -> Self {
        Self {
            ciphertext: BASE64.encode(&envelope.ciphertext),
            nonce: BASE64.encode(envelope.nonce),
            device_public_key: BASE64.encode(envelope.device_public_key),
        }
    }
}

impl From<EncryptedEnvelope> for WireEnvelope {
    fn from(envelope: EncryptedEnvelope) -> Self {
        Self::from(&envelope)
    }
}

impl TryFrom<&WireEnvelope> for EncryptedEnvelope {
    type Error = CryptoError;

    fn try_from(wire: &WireEnvelope) -> Result<Self> {
        let ciphertext = BASE64
            .decode(wire.ciphertext.as_bytes())
            .map_err(|e| CryptoError::serialization("decode_ciphertext", e))?;

        let nonce = BASE64
            .decode(wire.nonce.as_bytes())
            .map_err(|e| CryptoError::serialization("decode_nonce", e))?;
        let nonce: [u8; CHACHA20_NONCE_SIZE] = nonce.as_slice().try_into().map_err(|_| {
            CryptoError::serialization(
                "decode_nonce",
                format!(
                    "expected {} bytes, got {}",
                    CHACHA20_NONCE_SIZE,
                    nonce.len()
                ),
            )
        })?;

        let device_public_key = BASE64
            .decode(wire.device_public_key.as_bytes())
            .map_err(|e| CryptoError::peer_key("device_public_key", format!("invalid base64: {}", e)))?;
        let device_public_key: [u8; X25519_KEY_SIZE] =
            device_public_key.as_slice().try_into().map_err(|_| {
                CryptoError::peer_key(
                    "device_public_key",
                    format!(
                        "expected {} bytes, got {}",
                        X25519_KEY_SIZE,
                        device_public_key.len()
                    ),
                )
            })?;

        Ok(Self {
            ciphertext,
            nonce,
            device_public_key,
        })
    }
}

impl TryFrom<WireEnvelope> for EncryptedEnvelope {
    type Error = CryptoError;

    fn try_from(wire: WireEnvelope) -> Result<Self> {
        Self::try_from(&wire)
    }
}

/// Ingestion payload: the envelope plus plaintext metadata
///
/// Only `sensored_data` is confidential. Time, device id and location travel
/// in the clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimateRecord {
    /// Base64 ciphertext of the reading
    pub sensored_data: String,
    /// Base64 nonce
    pub nonce: String,
    /// Sample time
    pub time: DateTime<Utc>,
    /// Device identifier
    pub device_id: String,
    /// IANA timezone name, empty when unknown
    #[serde(default)]
    pub timezone: String,
    /// Degrees
    pub longitude: f64,
    /// Degrees
    pub latitude: f64,
    /// Base64 device public key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_public_key: Option<String>,
}

impl ClimateRecord {
    /// Wrap a sealed envelope with its plaintext metadata
    pub fn new(
        envelope: &WireEnvelope,
        device_id: &str,
        time: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        timezone: &str,
    ) -> Self {
        Self {
            sensored_data: envelope.ciphertext.clone(),
            nonce: envelope.nonce.clone(),
            time,
            device_id: device_id.to_string(),
            timezone: timezone.to_string(),
            longitude,
            latitude,
            device_public_key: Some(envelope.device_public_key.clone()),
        }
    }

    /// Rebuild the wire envelope of a stored record
    ///
    /// `device_public_key` is used when the record does not carry one.
    pub fn envelope(&self, device_public_key: &str) -> WireEnvelope {
        WireEnvelope {
            ciphertext: self.sensored_data.clone(),
            nonce: self.nonce.clone(),
            device_public_key: self
                .device_public_key
                .clone()
                .unwrap_or_else(|| device_public_key.to_string()),
        }
    }
}
