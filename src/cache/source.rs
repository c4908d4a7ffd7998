// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Server key sources
//!
//! Where the collector's public key comes from. The cache calls a source at
//! most once per fill and never retries on its own.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::crypto::{CryptoError, Result};

/// Trait for fetching the collector's public key
///
/// Implementations return the key exactly as distributed: standard base64 of
/// 32 bytes. The cache does the decoding and length check.
#[async_trait]
pub trait ServerKeySource: Send + Sync {
    /// Fetch the base64 server public key
    async fn fetch_server_key(&self) -> Result<String>;

    /// Source name for logging
    fn name(&self) -> &'static str;
}

/// Accepted JSON bodies from the key-distribution endpoint
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeyResponse {
    Object {
        #[serde(alias = "key", alias = "public_key", rename = "publicKey")]
        public_key: String,
    },
    Bare(String),
}

/// Fetches the key with a plain HTTP GET
pub struct HttpServerKeySource {
    endpoint: String,
    client: Client,
}

impl HttpServerKeySource {
    /// Create a source for `endpoint`
    ///
    /// # Arguments
    /// * `endpoint` - Full URL of the key-distribution endpoint
    /// * `request_timeout` - Transport-level timeout for one request
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CryptoError::CacheFetchError {
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    /// Endpoint this source queries
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Pull the base64 key out of an endpoint response body
pub(crate) fn parse_key_response(body: &str) -> Result<String> {
    let body = body.trim();
    if body.is_empty() {
        return Err(CryptoError::CacheFetchError {
            reason: "empty response body".to_string(),
        });
    }

    match serde_json::from_str::<KeyResponse>(body) {
        Ok(KeyResponse::Object { public_key }) | Ok(KeyResponse::Bare(public_key)) => {
            Ok(public_key.trim().to_string())
        }
        // Not JSON at all: the endpoint returned the raw base64 string
        Err(_) if !body.starts_with('{') => Ok(body.to_string()),
        Err(e) => Err(CryptoError::CacheFetchError {
            reason: format!("unrecognised key response: {}", e),
        }),
    }
}

#[async_trait]
impl ServerKeySource for HttpServerKeySource {
    async fn fetch_server_key(&self) -> Result<String> {
        debug!(endpoint = %self.endpoint, "fetching server public key");

        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| CryptoError::CacheFetchError {
                reason: if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    format!("request failed: {}", e)
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CryptoError::CacheFetchError {
                reason: format!("endpoint returned HTTP {}", status.as_u16()),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CryptoError::CacheFetchError {
                reason: format!("failed to read response body: {}", e),
            })?;

        parse_key_response(&body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// A fixed key, for collectors that know their own key and for tests
#[derive(Debug, Clone)]
pub struct StaticServerKeySource {
    public_key: String,
}

impl StaticServerKeySource {
    /// Serve `public_key` (base64) on every fetch
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
        }
    }
}

#[async_trait]
impl ServerKeySource for StaticServerKeySource {
    async fn fetch_server_key(&self) -> Result<String> {
        Ok(self.public_key.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
