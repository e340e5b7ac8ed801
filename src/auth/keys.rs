//! Signing-key sources and the process-wide key cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::AuthError;

/// Default time a fetched key set is trusted before it is refetched.
pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Minimum spacing between refreshes triggered by an unknown `kid`.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Number of fetch attempts per refresh.
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 2;

/// Deadline for a single key fetch attempt.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

const FETCH_BACKOFF: Duration = Duration::from_millis(200);

// =============================================================================
// Key Sources
// =============================================================================

/// A single verification key, optionally tagged with its key id.
#[derive(Clone)]
pub struct VerificationKey {
    pub kid: Option<String>,
    pub key: DecodingKey,
}

impl VerificationKey {
    pub fn new(kid: Option<String>, key: DecodingKey) -> Self {
        Self { kid, key }
    }
}

/// Somewhere the issuer's current signing keys can be fetched from.
#[async_trait]
pub trait KeySource: Send + Sync + 'static {
    async fn fetch_keys(&self) -> Result<Vec<VerificationKey>, AuthError>;
}

/// Key source backed by the issuer's published JWKS document.
#[derive(Clone)]
pub struct JwksKeySource {
    client: reqwest::Client,
    url: String,
}

impl JwksKeySource {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("JWKS client setup failed, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            client,
            url: url.into(),
        }
    }

    /// Key source for the conventional `/.well-known/jwks.json` of an issuer.
    pub fn for_issuer(issuer: &str) -> Self {
        Self::new(jwks_url_for_issuer(issuer))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Derive the JWKS endpoint from an issuer base URL.
pub fn jwks_url_for_issuer(issuer: &str) -> String {
    format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/'))
}

#[async_trait]
impl KeySource for JwksKeySource {
    async fn fetch_keys(&self) -> Result<Vec<VerificationKey>, AuthError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthError::KeysUnavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::KeysUnavailable(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::KeysUnavailable(format!("invalid JWKS document: {}", e)))?;

        Ok(keys_from_jwks(&jwks))
    }
}

/// Convert a JWKS document into verification keys, skipping entries that
/// cannot be turned into a decoding key.
pub fn keys_from_jwks(jwks: &JwkSet) -> Vec<VerificationKey> {
    let mut keys = Vec::with_capacity(jwks.keys.len());
    for jwk in &jwks.keys {
        match DecodingKey::from_jwk(jwk) {
            Ok(key) => keys.push(VerificationKey::new(jwk.common.key_id.clone(), key)),
            Err(e) => debug!(
                kid = jwk.common.key_id.as_deref().unwrap_or("-"),
                "Skipping unusable JWK: {}", e
            ),
        }
    }
    keys
}

/// Fixed key set, for deployments that verify with a pre-shared key.
#[derive(Clone, Default)]
pub struct StaticKeySource {
    keys: Vec<VerificationKey>,
}

impl StaticKeySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, kid: Option<&str>, key: DecodingKey) -> Self {
        self.keys
            .push(VerificationKey::new(kid.map(str::to_string), key));
        self
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn fetch_keys(&self) -> Result<Vec<VerificationKey>, AuthError> {
        Ok(self.keys.clone())
    }
}

// =============================================================================
// Key Cache
// =============================================================================

#[derive(Default)]
struct CacheState {
    keys: Vec<VerificationKey>,
    fetched_at: Option<Instant>,
    attempted_at: Option<Instant>,
    last_error: Option<AuthError>,
}

/// What the cache can answer without fetching.
enum Cached {
    /// Final answer, no fetch needed
    Ready(Result<DecodingKey, AuthError>),
    /// Key past its TTL; usable while another caller refreshes
    Stale(DecodingKey),
    /// Nothing usable
    Missing,
}

impl CacheState {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.is_some_and(|at| at.elapsed() < ttl)
    }

    fn attempted_within(&self, interval: Duration) -> bool {
        self.attempted_at.is_some_and(|at| at.elapsed() < interval)
    }

    fn find(&self, kid: Option<&str>) -> Option<DecodingKey> {
        match kid {
            Some(kid) => self
                .keys
                .iter()
                .find(|k| k.kid.as_deref() == Some(kid))
                .map(|k| k.key.clone()),
            None if self.keys.len() == 1 => Some(self.keys[0].key.clone()),
            None => None,
        }
    }

    fn lookup(&self, kid: Option<&str>, ttl: Duration, min_refresh: Duration) -> Cached {
        let recent_attempt = self.attempted_within(min_refresh);
        match self.find(kid) {
            Some(key) if self.is_fresh(ttl) => Cached::Ready(Ok(key)),
            // The last refresh failed recently; keep serving what we have.
            Some(key) if recent_attempt && self.last_error.is_some() => Cached::Ready(Ok(key)),
            Some(key) => Cached::Stale(key),
            None if recent_attempt => Cached::Ready(Err(self
                .last_error
                .clone()
                .unwrap_or_else(|| miss(kid)))),
            None => Cached::Missing,
        }
    }
}

fn miss(kid: Option<&str>) -> AuthError {
    match kid {
        Some(kid) => AuthError::UnknownKey {
            kid: kid.to_string(),
        },
        None => AuthError::MissingKeyId,
    }
}

/// Process-wide cache of issuer signing keys.
///
/// Keys are looked up by `kid`. The set is refetched when it is older than the
/// TTL, or when a token names a `kid` the cache does not hold. Any fetch,
/// successful or not, holds off miss-driven refetches for the minimum refresh
/// interval.
///
/// Only one refresh runs at a time. Callers that hold a stale key keep using
/// it while the refresh is in flight; the state lock is never held across a
/// fetch.
pub struct KeyCache {
    source: Arc<dyn KeySource>,
    state: RwLock<CacheState>,
    refresh: Mutex<()>,
    ttl: Duration,
    min_refresh_interval: Duration,
    fetch_attempts: u32,
    fetch_timeout: Duration,
}

impl KeyCache {
    pub fn new(source: impl KeySource) -> Self {
        Self {
            source: Arc::new(source),
            state: RwLock::new(CacheState::default()),
            refresh: Mutex::new(()),
            ttl: DEFAULT_KEY_CACHE_TTL,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Set the number of fetch attempts per refresh (at least one).
    pub fn with_fetch_attempts(mut self, attempts: u32) -> Self {
        self.fetch_attempts = attempts.max(1);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Resolve the decoding key for a token's `kid`.
    pub async fn key_for(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        let stale = match self.cached(kid).await {
            Cached::Ready(result) => return result,
            Cached::Stale(key) => Some(key),
            Cached::Missing => None,
        };

        let _refresh = match self.refresh.try_lock() {
            Ok(guard) => guard,
            Err(_) => match stale {
                Some(key) => {
                    debug!("Refresh in progress, using cached signing key");
                    return Ok(key);
                }
                None => self.refresh.lock().await,
            },
        };

        // Another caller may have refreshed while we waited for the lock.
        if let Cached::Ready(result) = self.cached(kid).await {
            return result;
        }

        let outcome = self.fetch().await;

        let mut state = self.state.write().await;
        state.attempted_at = Some(Instant::now());
        match outcome {
            Ok(keys) => {
                info!(count = keys.len(), "Refreshed signing keys");
                state.keys = keys;
                state.fetched_at = state.attempted_at;
                state.last_error = None;
                state.find(kid).ok_or_else(|| miss(kid))
            }
            Err(e) => {
                state.last_error = Some(e.clone());
                match state.find(kid) {
                    Some(key) => {
                        warn!("Using stale signing key after refresh failure: {}", e);
                        Ok(key)
                    }
                    None => Err(e),
                }
            }
        }
    }

    async fn cached(&self, kid: Option<&str>) -> Cached {
        self.state
            .read()
            .await
            .lookup(kid, self.ttl, self.min_refresh_interval)
    }

    async fn fetch(&self) -> Result<Vec<VerificationKey>, AuthError> {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.fetch_timeout, self.source.fetch_keys())
                .await
            {
                Ok(result) => result,
                Err(_) => Err(AuthError::KeysUnavailable(format!(
                    "key fetch timed out after {}ms",
                    self.fetch_timeout.as_millis()
                ))),
            };

            match result {
                Ok(keys) => return Ok(keys),
                Err(e) if attempt < self.fetch_attempts => {
                    warn!(attempt, "Signing key fetch failed: {}", e);
                    tokio::time::sleep(FETCH_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
