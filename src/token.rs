//! # Partner API Token Derivation
//!
//! The partner gateway authenticates every request with three headers: the
//! dealer's API key, a millisecond request timestamp, and a token derived
//! from both with the dealer's secret key. This module owns that derivation
//! and a small per-API-key LRU cache so a busy dealer does not re-derive on
//! every call. A 401 from the gateway bypasses the cache once via
//! [`TokenManager::force_refresh`] before the request is surfaced as an
//! authentication failure.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use hmac::{Hmac, Mac};
use lru::LruCache;
use sha2::Sha256;
use tracing::debug;

use crate::config::TokenConfig;
use crate::error::SyncError;

type HmacSha256 = Hmac<Sha256>;

/// Authentication header values for a single partner API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiHeaders {
    /// Dealer API key, sent as `X-Api-Key`.
    pub api_key: String,
    /// Derived request token, sent as `X-Api-Token`.
    pub token: String,
    /// Unix epoch milliseconds used in the derivation, sent as `X-Request-Time`.
    pub request_time_ms: i64,
}

/// Cached derivation result for one API key.
struct TokenState {
    token: String,
    request_time_ms: i64,
    issued_at: Instant,
}

/// Derive the request token for the given credentials and timestamp.
///
/// The token is the lowercase hex encoding of
/// `HMAC-SHA256(key = secret_key, message = "{api_key}:{request_time_ms}")`.
/// Identical inputs always produce an identical token, so a request can be
/// replayed byte-for-byte for debugging against the gateway's own logs.
pub fn derive_token(
    api_key: &str,
    secret_key: &str,
    request_time_ms: i64,
) -> Result<String, SyncError> {
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| SyncError::Auth("invalid secret key for token derivation".to_string()))?;
    mac.update(api_key.as_bytes());
    mac.update(b":");
    mac.update(request_time_ms.to_string().as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Caches derived tokens per API key until the configured TTL lapses.
pub struct TokenManager {
    ttl: Duration,
    cache: Mutex<LruCache<String, TokenState>>,
}

impl TokenManager {
    /// Create a manager from the service token configuration.
    pub fn new(config: &TokenConfig) -> Self {
        Self::with_parts(
            Duration::from_secs(config.ttl_seconds),
            config.cache_capacity,
        )
    }

    /// Create a manager with an explicit TTL and cache capacity.
    pub fn with_parts(ttl: Duration, cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return the authentication headers for a request, reusing the cached
    /// token while it is younger than the TTL and deriving a fresh one
    /// otherwise.
    pub fn get_headers(&self, api_key: &str, secret_key: &str) -> Result<ApiHeaders, SyncError> {
        let now = Instant::now();
        let mut cache = self.cache.lock().unwrap();

        let mut stale_ms = None;
        if let Some(state) = cache.get(api_key) {
            if now.duration_since(state.issued_at) < self.ttl {
                return Ok(ApiHeaders {
                    api_key: api_key.to_string(),
                    token: state.token.clone(),
                    request_time_ms: state.request_time_ms,
                });
            }
            stale_ms = Some(state.request_time_ms);
        }

        Self::mint(&mut cache, api_key, secret_key, stale_ms)
    }

    /// Derive a fresh token regardless of cache state, replacing any cached
    /// entry for this API key.
    ///
    /// Called once by the client after a 401 in case the cached token aged
    /// out on the gateway side; a second 401 is treated as a credential
    /// problem, not a staleness problem.
    pub fn force_refresh(&self, api_key: &str, secret_key: &str) -> Result<ApiHeaders, SyncError> {
        let mut cache = self.cache.lock().unwrap();
        let previous_ms = cache.peek(api_key).map(|state| state.request_time_ms);
        debug!(previous_ms, "forcing token refresh");
        Self::mint(&mut cache, api_key, secret_key, previous_ms)
    }

    /// Derive a token for the current time and store it in the cache.
    ///
    /// The timestamp is bumped past `floor_ms` when the clock has not moved
    /// since the previous derivation, so a forced refresh always yields a
    /// token different from the one the gateway just rejected.
    fn mint(
        cache: &mut LruCache<String, TokenState>,
        api_key: &str,
        secret_key: &str,
        floor_ms: Option<i64>,
    ) -> Result<ApiHeaders, SyncError> {
        let mut request_time_ms = Utc::now().timestamp_millis();
        if let Some(previous) = floor_ms {
            if request_time_ms <= previous {
                request_time_ms = previous + 1;
            }
        }

        let token = derive_token(api_key, secret_key, request_time_ms)?;
        cache.put(
            api_key.to_string(),
            TokenState {
                token: token.clone(),
                request_time_ms,
                issued_at: Instant::now(),
            },
        );

        Ok(ApiHeaders {
            api_key: api_key.to_string(),
            token,
            request_time_ms,
        })
    }
}
