// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Configuration for the sensor envelope protocol

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::crypto::{validate_context, AeadCodec, DEFAULT_KDF_CONTEXT, DEFAULT_KDF_KEY_ID};

/// Default key-distribution endpoint
pub const DEFAULT_KEY_ENDPOINT: &str = "http://localhost:4000/api/climate/key";

/// Default wait for the server key, in milliseconds
pub const DEFAULT_KEY_FETCH_TIMEOUT_MS: u64 = 5000;

/// Protocol parameters shared by devices and the collector
///
/// Both sides must agree on `kdf_context`, `kdf_key_id` and
/// `bind_device_key`, otherwise every envelope fails authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// KDF context label (1 to 8 bytes)
    pub kdf_context: String,
    /// KDF key id
    pub kdf_key_id: u64,
    /// URL the server public key is fetched from
    pub key_endpoint: String,
    /// Per-caller wait for the server public key in milliseconds
    pub key_fetch_timeout_ms: u64,
    /// Device keystore file; in-memory when unset
    pub keystore_path: Option<PathBuf>,
    /// Bind the device public key into the AEAD associated data
    pub bind_device_key: bool,
}

impl ProtocolConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            kdf_context: env::var("SENSOR_KDF_CONTEXT")
                .unwrap_or_else(|_| DEFAULT_KDF_CONTEXT.to_string()),
            kdf_key_id: env::var("SENSOR_KDF_KEY_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_KDF_KEY_ID),
            key_endpoint: env::var("SENSOR_KEY_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_KEY_ENDPOINT.to_string()),
            key_fetch_timeout_ms: env::var("SENSOR_KEY_FETCH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_KEY_FETCH_TIMEOUT_MS),
            keystore_path: env::var("SENSOR_KEYSTORE_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            // Set SENSOR_BIND_DEVICE_KEY=false for peers that use no associated data
            bind_device_key: env::var("SENSOR_BIND_DEVICE_KEY")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        validate_context(&self.kdf_context).map_err(|e| e.to_string())?;
        if self.key_fetch_timeout_ms == 0 {
            return Err("Key fetch timeout must be greater than 0".to_string());
        }
        if self.key_endpoint.trim().is_empty() {
            return Err("Key endpoint must not be empty".to_string());
        }
        Ok(())
    }

    /// Per-caller wait for the server public key
    pub fn key_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.key_fetch_timeout_ms)
    }

    /// AEAD codec matching `bind_device_key`
    pub fn codec(&self) -> AeadCodec {
        AeadCodec::new(self.bind_device_key)
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            kdf_context: DEFAULT_KDF_CONTEXT.to_string(),
            kdf_key_id: DEFAULT_KDF_KEY_ID,
            key_endpoint: DEFAULT_KEY_ENDPOINT.to_string(),
            key_fetch_timeout_ms: DEFAULT_KEY_FETCH_TIMEOUT_MS,
            keystore_path: None,
            bind_device_key: true,
        }
    }
}
