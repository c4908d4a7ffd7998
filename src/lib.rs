// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-end encrypted envelopes for IoT temperature/humidity readings.
//!
//! Devices derive a long-term X25519 keypair from their identifier, agree on
//! a per-device key with the collector, and seal each reading with
//! ChaCha20-Poly1305. Only the collector holding the matching private key
//! can open them.

pub mod cache;
pub mod channel;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod version;

pub use cache::{EnvelopeCache, HttpServerKeySource, ServerKeySource, StaticServerKeySource};
pub use channel::{CollectorChannel, DeviceChannel};
pub use config::ProtocolConfig;
pub use crypto::{
    CryptoError, DeviceIdentity, EncryptedEnvelope, SensorReading, ServerIdentity, ServerKeyPair,
    WireEnvelope,
};
