// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde_json::json;
use tracing::info;

use crate::channel::{CollectorChannel, DeviceChannel};
use crate::config::ProtocolConfig;
use crate::crypto::{derive_device_keypair, SensorReading, ServerIdentity, ServerKeyPair, WireEnvelope};

/// Arguments for keygen command
#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Device identifier to derive the keypair for
    #[arg(long)]
    pub device_id: String,
}

/// Arguments for seal command
#[derive(Args, Debug)]
pub struct SealArgs {
    /// Device identifier
    #[arg(long)]
    pub device_id: String,

    /// Temperature in degrees Celsius
    #[arg(long, allow_hyphen_values = true)]
    pub temperature: f64,

    /// Relative humidity in percent
    #[arg(long)]
    pub humidity: f64,

    /// Server public key (base64); fetched from SENSOR_KEY_ENDPOINT when omitted
    #[arg(long, env = "SENSOR_SERVER_PUBLIC_KEY")]
    pub server_key: Option<String>,
}

/// Arguments for open command
#[derive(Args, Debug)]
pub struct OpenArgs {
    /// Device identifier the envelope belongs to
    #[arg(long)]
    pub device_id: String,

    /// Envelope JSON `{ciphertext, nonce, devicePublicKey}`
    #[arg(long)]
    pub envelope: String,

    /// Server public key (base64); fetched from SENSOR_KEY_ENDPOINT when omitted
    #[arg(long, env = "SENSOR_SERVER_PUBLIC_KEY")]
    pub server_key: Option<String>,
}

/// Arguments for collect command
#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Collector private key (base64)
    #[arg(long, env = "SENSOR_SERVER_PRIVATE_KEY", hide_env_values = true)]
    pub server_private_key: String,

    /// Envelope JSON `{ciphertext, nonce, devicePublicKey}`
    #[arg(long)]
    pub envelope: String,
}

fn load_config() -> Result<ProtocolConfig> {
    let config = ProtocolConfig::from_env();
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

fn device_channel(config: &ProtocolConfig, server_key: Option<&str>) -> Result<DeviceChannel> {
    let channel = DeviceChannel::from_config(config)?;
    if let Some(encoded) = server_key {
        channel.cache().seed(ServerIdentity::from_base64(encoded)?);
    }
    Ok(channel)
}

fn parse_envelope(raw: &str) -> Result<WireEnvelope> {
    serde_json::from_str(raw).context("Envelope must be JSON with ciphertext, nonce and devicePublicKey")
}

/// Print the derived public key of a device
pub async fn keygen(args: KeygenArgs) -> Result<()> {
    let identity = derive_device_keypair(&args.device_id)?;
    println!("{}", identity.public_key_base64());
    Ok(())
}

/// Generate and print a fresh collector keypair
pub async fn server_keygen() -> Result<()> {
    let keypair = ServerKeyPair::generate();
    let private_key = base64_private(&keypair);
    let output = json!({
        "publicKey": keypair.public_identity().to_base64(),
        "privateKey": private_key,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    info!("🔑 Generated collector keypair; store the private key securely");
    Ok(())
}

fn base64_private(keypair: &ServerKeyPair) -> String {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    BASE64.encode(keypair.private_key_bytes().as_slice())
}

/// Seal a reading and print the envelope JSON
pub async fn seal(args: SealArgs) -> Result<()> {
    let config = load_config()?;
    let channel = device_channel(&config, args.server_key.as_deref())?;

    let reading = SensorReading::new(args.temperature, args.humidity)?;
    let envelope = channel.seal(&reading, &args.device_id).await?;

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

/// Open an envelope on the device side and print the reading JSON
pub async fn open(args: OpenArgs) -> Result<()> {
    let config = load_config()?;
    let channel = device_channel(&config, args.server_key.as_deref())?;

    let envelope = parse_envelope(&args.envelope)?;
    let reading = channel.open(&envelope, &args.device_id).await?;

    println!("{}", serde_json::to_string(&reading)?);
    Ok(())
}

/// Open an envelope as the collector and print the reading JSON
pub async fn collect(args: CollectArgs) -> Result<()> {
    let config = load_config()?;
    let keypair = ServerKeyPair::from_base64(&args.server_private_key)?;
    let collector = CollectorChannel::new(keypair, &config)?;

    let envelope = parse_envelope(&args.envelope)?;
    let reading = collector.open(&envelope).await?;

    println!("{}", serde_json::to_string(&reading)?);
    Ok(())
}
