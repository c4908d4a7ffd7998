// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Server public key cache
//!
//! Devices need the collector's public key before they can seal anything.
//! [`EnvelopeCache`] fetches it lazily, once, and shares one in-flight fetch
//! between every caller that arrives while it is pending.
//!
//! ## States
//!
//! ```text
//! Empty --first call--> Pending --Ok--> Ready
//!   ^                      |
//!   +--Err/timeout/cancel--+
//! ```
//!
//! A caller that times out or is cancelled gets its own `CacheFetchError`.
//! The fetch stays pending while any other caller still waits on it, so at
//! most one fetch is ever in flight. When the last waiter gives up, the cache
//! drops back to `Empty` and the next call starts a fresh fetch. A stale
//! result never overwrites a newer fill: every fill carries a generation
//! number.

pub mod source;

pub use source::{HttpServerKeySource, ServerKeySource, StaticServerKeySource};

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::crypto::{CryptoError, Result, ServerIdentity};

type SharedFetch = Shared<BoxFuture<'static, Result<ServerIdentity>>>;

enum CacheState {
    Empty,
    Pending { generation: u64, fetch: SharedFetch },
    Ready(ServerIdentity),
}

struct CacheInner {
    state: CacheState,
    generation: u64,
}

/// Lazily filled, single-flight cache of the collector's public key
pub struct EnvelopeCache {
    source: Arc<dyn ServerKeySource>,
    inner: Mutex<CacheInner>,
    fetch_timeout: Duration,
    fetches_started: AtomicU64,
}

impl EnvelopeCache {
    /// Create an empty cache over `source`
    ///
    /// # Arguments
    /// * `source` - Where the key is fetched from
    /// * `fetch_timeout` - Default per-caller wait for [`get_server_public_key`](Self::get_server_public_key)
    pub fn new(source: Arc<dyn ServerKeySource>, fetch_timeout: Duration) -> Self {
        Self {
            source,
            inner: Mutex::new(CacheInner {
                state: CacheState::Empty,
                generation: 0,
            }),
            fetch_timeout,
            fetches_started: AtomicU64::new(0),
        }
    }

    /// Return the cached key, fetching it on first use
    ///
    /// Uses the default timeout and no cancellation.
    pub async fn get_server_public_key(&self) -> Result<ServerIdentity> {
        self.get_server_public_key_with(self.fetch_timeout, &CancellationToken::new())
            .await
    }

    /// Return the cached key with a caller-supplied timeout and cancellation
    ///
    /// Concurrent callers on a cold cache share a single fetch. Every waiter
    /// that stays until the end sees the same outcome. A failed fetch leaves
    /// the cache empty, and so does a timeout or cancellation of the last
    /// remaining waiter.
    ///
    /// # Errors
    ///
    /// - `CacheFetchError` if the source fails, the wait times out or `cancel` fires
    /// - `InvalidPeerKey` if the fetched value is not base64 of 32 bytes
    pub async fn get_server_public_key_with(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ServerIdentity> {
        let (generation, fetch) = {
            let mut inner = self.lock();
            let in_flight = match &inner.state {
                CacheState::Ready(identity) => return Ok(*identity),
                CacheState::Pending { generation, fetch } => Some((*generation, fetch.clone())),
                CacheState::Empty => None,
            };

            match in_flight {
                Some((generation, fetch)) => {
                    debug!(generation, "joining in-flight server key fetch");
                    (generation, fetch)
                }
                None => {
                    inner.generation += 1;
                    let generation = inner.generation;
                    let fetch = self.start_fetch(generation);
                    inner.state = CacheState::Pending {
                        generation,
                        fetch: fetch.clone(),
                    };
                    (generation, fetch)
                }
            }
        };

        // `abandoned` marks a caller that gave up while the fetch may still run
        let (outcome, abandoned) = tokio::select! {
            _ = cancel.cancelled() => (
                Err(CryptoError::CacheFetchError {
                    reason: "fetch cancelled".to_string(),
                }),
                true,
            ),
            waited = tokio::time::timeout(timeout, fetch) => match waited {
                Ok(result) => (result, false),
                Err(_) => (
                    Err(CryptoError::CacheFetchError {
                        reason: format!("timed out after {} ms", timeout.as_millis()),
                    }),
                    true,
                ),
            },
        };

        let mut inner = self.lock();
        match outcome {
            Ok(identity) => {
                if inner.generation == generation && !matches!(inner.state, CacheState::Ready(_)) {
                    inner.state = CacheState::Ready(identity);
                    info!(
                        source = self.source.name(),
                        public_key = %identity.to_base64(),
                        "🔑 server public key cached"
                    );
                }
                Ok(identity)
            }
            Err(e) => {
                let reset = match &inner.state {
                    CacheState::Pending {
                        generation: pending,
                        fetch,
                    } if *pending == generation => !abandoned || Self::is_unwatched(fetch),
                    _ => false,
                };
                if reset {
                    inner.state = CacheState::Empty;
                } else if abandoned {
                    debug!(generation, "caller gave up, fetch still has waiters");
                }
                warn!(source = self.source.name(), error = %e, "server public key unavailable");
                Err(e)
            }
        }
    }

    /// Drop the cached key; the next call fetches again
    pub fn invalidate(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.state = CacheState::Empty;
        info!("server public key cache invalidated");
    }

    /// Fill the cache with a known key, superseding any in-flight fetch
    pub fn seed(&self, identity: ServerIdentity) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.state = CacheState::Ready(identity);
        debug!(public_key = %identity.to_base64(), "server public key seeded");
    }

    /// True once a key is cached
    pub fn is_initialized(&self) -> bool {
        matches!(self.lock().state, CacheState::Ready(_))
    }

    /// Number of fetches started against the source so far
    pub fn fetches_started(&self) -> u64 {
        self.fetches_started.load(Ordering::SeqCst)
    }

    fn start_fetch(&self, generation: u64) -> SharedFetch {
        self.fetches_started.fetch_add(1, Ordering::SeqCst);
        info!(source = self.source.name(), generation, "fetching server public key");

        let source = self.source.clone();
        async move {
            let encoded = source.fetch_server_key().await?;
            ServerIdentity::from_base64(&encoded)
        }
        .boxed()
        .shared()
    }

    /// True when only the cache itself still holds the pending fetch
    ///
    /// A fetch that already completed is left alone; the waiter that polled
    /// it to completion settles the state.
    fn is_unwatched(fetch: &SharedFetch) -> bool {
        matches!(fetch.strong_count(), Some(count) if count <= 1)
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        // State transitions never panic mid-update, so a poisoned lock still holds a valid state
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EnvelopeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCache")
            .field("source", &self.source.name())
            .field("initialized", &self.is_initialized())
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}
