//! Client HTTP avec cache TTL, coalescence et retry
//!
//! `fetch` ne renvoie jamais d'erreur : les échecs sont rendus dans
//! `FetchResponse` (`ok: false`, statut 0 réseau, 408 timeout, 413 trop gros).

pub mod policy;
pub mod transport;

pub use policy::{feature_cap, is_live_positions, FetchPolicy, TtlClass};
pub use transport::{RawResponse, ReqwestTransport, Transport};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::future::{BoxFuture, Shared};
use futures::{FutureExt, StreamExt};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Échec d'une récupération
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Erreur de connexion ou de lecture (transitoire, retentée)
    #[error("Network error: {0}")]
    Network(String),

    /// Corps au-delà du plafond (terminal, jamais retenté)
    #[error("Response too large (limit {limit} bytes)")]
    Oversized { limit: u64 },

    /// Tentative hors délai (transitoire, compte comme une tentative)
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Oversized { .. })
    }

    /// Rendu de l'échec final dans la forme commune
    pub fn into_response(self) -> FetchResponse {
        match self {
            FetchError::Network(msg) => FetchResponse::failure(0, msg),
            FetchError::Oversized { .. } => {
                FetchResponse::failure(413, "Response too large, try with smaller dataset")
            }
            FetchError::Timeout(_) => FetchResponse::failure(408, "Request timeout after retries"),
        }
    }
}

/// Résultat d'un fetch, identique qu'il vienne du cache ou du réseau
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub ok: bool,
    pub status: u16,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn failure(status: u16, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            status,
            body: Bytes::from(message.into()),
        }
    }

    /// Corps en texte (UTF-8 avec remplacement)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Force la classe temps réel : ni lecture ni écriture du cache
    pub bypass_cache: bool,
}

impl FetchOptions {
    pub fn live() -> Self {
        Self { bypass_cache: true }
    }
}

struct CacheEntry {
    response: FetchResponse,
    fetched_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.fetched_at) <= self.ttl
    }
}

type InFlight = Shared<BoxFuture<'static, FetchResponse>>;

#[derive(Default)]
struct State {
    cache: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, InFlight>,
}

impl State {
    fn insert(&mut self, url: String, entry: CacheEntry, max_entries: usize) {
        if max_entries == 0 {
            return;
        }
        if !self.cache.contains_key(&url) && self.cache.len() >= max_entries {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|(_, e)| e.fetched_at)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                debug!(url = %key, "Evicting oldest cache entry");
                self.cache.remove(&key);
            }
        }
        self.cache.insert(url, entry);
    }
}

struct Inner<T> {
    transport: T,
    policy: FetchPolicy,
    state: Mutex<State>,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Client partagé ; les clones partagent cache et requêtes en cours
pub struct FetchClient<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for FetchClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> FetchClient<T> {
    pub fn new(transport: T, policy: FetchPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                policy,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.inner.policy
    }

    /// Récupère `url` depuis le cache, une requête en cours ou le réseau
    pub async fn fetch(&self, url: &str, options: FetchOptions) -> FetchResponse {
        let class = if options.bypass_cache {
            TtlClass::Live
        } else {
            TtlClass::classify(url)
        };
        let ttl = self.inner.policy.ttl(class);

        let operation = {
            let mut state = self.inner.lock();

            if !ttl.is_zero() {
                if let Some(entry) = state.cache.get(url) {
                    if entry.is_fresh(Instant::now()) {
                        debug!(url = %url, "Cache hit");
                        return entry.response.clone();
                    }
                }
            }

            match state.in_flight.get(url) {
                Some(existing) => {
                    debug!(url = %url, "Joining in-flight request");
                    existing.clone()
                }
                None => {
                    let operation = self.launch(url.to_string(), ttl);
                    state.in_flight.insert(url.to_string(), operation.clone());
                    operation
                }
            }
        };

        operation.await
    }

    /// Lance la récupération dans une tâche propre
    ///
    /// La tâche va au bout même si tous les appelants abandonnent, et retire
    /// elle-même son entrée de `in_flight`.
    fn launch(&self, url: String, ttl: Duration) -> InFlight {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let response = match inner.fetch_with_retry(&url).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(url = %url, error = %e, "Fetch failed");
                    e.into_response()
                }
            };

            let mut state = inner.lock();
            state.in_flight.remove(&url);
            if response.ok && !ttl.is_zero() {
                let entry = CacheEntry {
                    response: response.clone(),
                    fetched_at: Instant::now(),
                    ttl,
                };
                state.insert(url, entry, inner.policy.max_cache_entries);
            }
            response
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| FetchResponse::failure(0, format!("fetch task failed: {}", e)))
        }
        .boxed()
        .shared()
    }

    /// Vide le cache (les requêtes en cours ne sont pas touchées)
    pub fn clear(&self) {
        self.inner.lock().cache.clear();
    }

    /// Retire les entrées expirées, renvoie leur nombre
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.inner.lock();
        let before = state.cache.len();
        state.cache.retain(|_, entry| entry.is_fresh(now));
        before - state.cache.len()
    }

    pub fn cache_len(&self) -> usize {
        self.inner.lock().cache.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.inner.lock().in_flight.len()
    }
}

impl<T: Transport> Inner<T> {
    async fn fetch_with_retry(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = FetchError::Network("no attempt made".into());

        for attempt in 1..=max_attempts {
            let outcome = tokio::time::timeout(self.policy.request_timeout, self.attempt(url)).await;
            match outcome {
                Ok(Ok(response)) => {
                    info!(url = %url, status = response.status, attempt, bytes = response.body.len(), "Fetched");
                    return Ok(response);
                }
                Ok(Err(e)) if !e.is_retryable() => return Err(e),
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = FetchError::Timeout(self.policy.request_timeout),
            }

            if attempt < max_attempts {
                let wait = self.policy.backoff(attempt);
                debug!(url = %url, attempt, error = %last_error, ?wait, "Retrying");
                tokio::time::sleep(wait).await;
            }
        }

        Err(last_error)
    }

    /// Une tentative : requête puis lecture bornée du corps
    async fn attempt(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let limit = self.policy.max_response_bytes;
        let raw = self.transport.get(url).await?;

        if let Some(length) = raw.content_length {
            if length > limit {
                return Err(FetchError::Oversized { limit });
            }
        }

        let mut body = BytesMut::new();
        let mut stream = raw.body;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(FetchError::Oversized { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchResponse {
            ok: (200..300).contains(&raw.status),
            status: raw.status,
            body: body.freeze(),
        })
    }
}
