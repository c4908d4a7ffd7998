// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tests for the single-flight server key cache

use async_trait::async_trait;
use sensor_envelope::cache::{EnvelopeCache, ServerKeySource};
use sensor_envelope::crypto::{CryptoError, Result, ServerKeyPair};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Source that counts calls and answers after a per-call delay
struct CountingSource {
    key: String,
    calls: AtomicUsize,
    delays_ms: Vec<u64>,
    fail: bool,
}

impl CountingSource {
    fn new(key: String, delays_ms: Vec<u64>) -> Self {
        Self {
            key,
            calls: AtomicUsize::new(0),
            delays_ms,
            fail: false,
        }
    }

    fn failing(delay_ms: u64) -> Self {
        Self {
            key: String::new(),
            calls: AtomicUsize::new(0),
            delays_ms: vec![delay_ms],
            fail: true,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerKeySource for CountingSource {
    async fn fetch_server_key(&self) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .delays_ms
            .get(call)
            .or(self.delays_ms.last())
            .copied()
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        if self.fail {
            return Err(CryptoError::CacheFetchError {
                reason: "endpoint returned HTTP 503".to_string(),
            });
        }
        Ok(self.key.clone())
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

fn server_key() -> (ServerKeyPair, String) {
    let server = ServerKeyPair::generate();
    let encoded = server.public_identity().to_base64();
    (server, encoded)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifty_concurrent_callers_one_fetch() {
    let (server, encoded) = server_key();
    let source = Arc::new(CountingSource::new(encoded, vec![100]));
    let cache = Arc::new(EnvelopeCache::new(source.clone(), Duration::from_secs(5)));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_server_public_key().await })
        })
        .collect();

    for handle in handles {
        let key = handle.await.unwrap().unwrap();
        assert_eq!(key, server.public_identity());
    }

    assert_eq!(source.calls(), 1);
    assert_eq!(cache.fetches_started(), 1);
    assert!(cache.is_initialized());
}

#[tokio::test]
async fn test_cached_key_is_reused() {
    let (_, encoded) = server_key();
    let source = Arc::new(CountingSource::new(encoded, vec![0]));
    let cache = EnvelopeCache::new(source.clone(), Duration::from_secs(1));

    for _ in 0..5 {
        cache.get_server_public_key().await.unwrap();
    }
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_failure_is_shared_then_retried() {
    let source = Arc::new(CountingSource::failing(50));
    let cache = Arc::new(EnvelopeCache::new(source.clone(), Duration::from_secs(1)));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_server_public_key().await })
        })
        .collect();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), "cache_fetch_error");
        assert!(err.to_string().contains("503"));
    }
    assert_eq!(source.calls(), 1);
    assert!(!cache.is_initialized());

    // Nothing retries on its own; the next caller starts a new fetch
    let _ = cache.get_server_public_key().await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_timeout_leaves_cache_empty() {
    let (server, encoded) = server_key();
    let source = Arc::new(CountingSource::new(encoded, vec![1000, 0]));
    let cache = EnvelopeCache::new(source.clone(), Duration::from_secs(5));

    let err = cache
        .get_server_public_key_with(Duration::from_millis(20), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CryptoError::CacheFetchError { .. }));
    assert!(err.to_string().contains("timed out"));
    assert!(!cache.is_initialized());

    let key = cache.get_server_public_key().await.unwrap();
    assert_eq!(key, server.public_identity());
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_cancellation_leaves_cache_empty() {
    let (server, encoded) = server_key();
    let source = Arc::new(CountingSource::new(encoded, vec![1000, 0]));
    let cache = EnvelopeCache::new(source.clone(), Duration::from_secs(5));

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = cache
        .get_server_public_key_with(Duration::from_secs(5), &token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "cache_fetch_error");
    assert!(err.to_string().contains("cancelled"));
    assert!(!cache.is_initialized());

    let key = cache.get_server_public_key().await.unwrap();
    assert_eq!(key, server.public_identity());
    assert_eq!(source.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_impatient_caller_does_not_restart_fetch() {
    let (server, encoded) = server_key();
    let source = Arc::new(CountingSource::new(encoded, vec![300]));
    let cache = Arc::new(EnvelopeCache::new(source.clone(), Duration::from_secs(5)));

    let spawn_patient = |cache: Arc<EnvelopeCache>| {
        tokio::spawn(async move { cache.get_server_public_key().await })
    };

    let mut handles: Vec<_> = (0..10).map(|_| spawn_patient(cache.clone())).collect();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let err = cache
        .get_server_public_key_with(Duration::from_millis(10), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timed out"));

    // Late arrivals join the fetch that is still running
    handles.extend((0..10).map(|_| spawn_patient(cache.clone())));

    for handle in handles {
        let key = handle.await.unwrap().unwrap();
        assert_eq!(key, server.public_identity());
    }

    assert_eq!(source.calls(), 1);
    assert_eq!(cache.fetches_started(), 1);
    assert!(cache.is_initialized());
}

#[tokio::test]
async fn test_cancelled_caller_leaves_fetch_for_others() {
    let (server, encoded) = server_key();
    let source = Arc::new(CountingSource::new(encoded, vec![200]));
    let cache = Arc::new(EnvelopeCache::new(source.clone(), Duration::from_secs(5)));

    let patient = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_server_public_key().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let token = CancellationToken::new();
    token.cancel();
    let err = cache
        .get_server_public_key_with(Duration::from_secs(5), &token)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cancelled"));

    let key = cache.get_server_public_key().await.unwrap();
    assert_eq!(key, server.public_identity());
    assert_eq!(patient.await.unwrap().unwrap(), server.public_identity());
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_already_cancelled_token() {
    let (_, encoded) = server_key();
    let source = Arc::new(CountingSource::new(encoded, vec![200]));
    let cache = EnvelopeCache::new(source, Duration::from_secs(5));

    let token = CancellationToken::new();
    token.cancel();

    let err = cache
        .get_server_public_key_with(Duration::from_secs(5), &token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "cache_fetch_error");
    assert!(!cache.is_initialized());
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let (_, encoded) = server_key();
    let source = Arc::new(CountingSource::new(encoded, vec![0]));
    let cache = EnvelopeCache::new(source.clone(), Duration::from_secs(1));

    cache.get_server_public_key().await.unwrap();
    cache.invalidate();
    assert!(!cache.is_initialized());

    cache.get_server_public_key().await.unwrap();
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_invalidate_discards_in_flight_result() {
    let (_, encoded) = server_key();
    let source = Arc::new(CountingSource::new(encoded, vec![100]));
    let cache = Arc::new(EnvelopeCache::new(source.clone(), Duration::from_secs(5)));

    let waiter = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_server_public_key().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cache.invalidate();

    // The waiter still gets its key, but it is not cached
    assert!(waiter.await.unwrap().is_ok());
    assert!(!cache.is_initialized());
}

#[tokio::test]
async fn test_malformed_key_is_invalid_peer_key() {
    let source = Arc::new(CountingSource::new("dG9vLXNob3J0".to_string(), vec![0]));
    let cache = EnvelopeCache::new(source, Duration::from_secs(1));

    let err = cache.get_server_public_key().await.unwrap_err();
    assert_eq!(err.kind(), "invalid_peer_key");
    assert!(!cache.is_initialized());
}
