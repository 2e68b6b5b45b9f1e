// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Refresh Policy
//!
//! - Lazy: keys are only fetched when a caller asks for them and the cached
//!   set is empty or past its TTL. There is no background task.
//! - A refresh is `GET <issuer>/.well-known/openid-configuration` followed by
//!   `GET <jwks_uri>`, or a single GET when a static JWKS URL is configured.
//! - At most one refresh is in flight. Concurrent misses wait for it and reuse
//!   its result, failures included.
//! - The fetch timeout bounds a whole lookup, waiting for the in-flight refresh
//!   included.
//! - The new [`KeySet`] replaces the old one in a single swap; readers never
//!   see a partially populated set.
//! - A stale set is never served after a failed refresh. The failure
//!   propagates as [`AuthError::UpstreamUnavailable`].
//!
//! ## Key Rotation
//!
//! [`SigningKeyStore::get_key`] forces one refresh when a token names a `kid`
//! the cached set lacks, at most once per refresh cooldown.
//!
//! Time is read through [`tokio::time::Instant`], so tests drive the TTL with
//! tokio's paused clock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, KeyAlgorithm as JwkAlgorithm, PublicKeyUse};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

use super::error::AuthError;

/// Default KeySet TTL (1 hour).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Upper bound on a whole refresh (discovery + JWKS).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum spacing between refreshes forced by an unknown `kid`.
pub const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(60);

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Public-key algorithm of a [`SigningKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
}

/// Why a JWK or JWKS document cannot be used.
#[derive(Debug, Error)]
pub enum JwkError {
    #[error("not a JWKS document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    #[error("JWK has no kid")]
    MissingKeyId,

    #[error("JWK {0} is not a signature key")]
    NotForSigning(String),

    #[error("JWK {kid} declares {alg}, not RS256")]
    UnsupportedAlgorithm { kid: String, alg: String },

    #[error("JWK {0} is not an RSA key")]
    NotRsa(String),

    #[error("JWK {kid} has unusable RSA components: {source}")]
    InvalidRsaComponents {
        kid: String,
        source: jsonwebtoken::errors::Error,
    },
}

/// An identity provider public key, ready for signature verification.
#[derive(Clone)]
pub struct SigningKey {
    key_id: String,
    algorithm: KeyAlgorithm,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Convert a JWK into a signing key.
    ///
    /// Only RSA signature keys with a `kid` qualify. A key that declares an
    /// algorithm must declare RS256.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, JwkError> {
        let key_id = jwk.common.key_id.clone().ok_or(JwkError::MissingKeyId)?;

        if let Some(key_use) = &jwk.common.public_key_use {
            if *key_use != PublicKeyUse::Signature {
                return Err(JwkError::NotForSigning(key_id));
            }
        }

        if let Some(alg) = jwk.common.key_algorithm {
            if alg != JwkAlgorithm::RS256 {
                return Err(JwkError::UnsupportedAlgorithm {
                    kid: key_id,
                    alg: format!("{alg:?}"),
                });
            }
        }

        match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => {
                let decoding_key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map_err(
                    |source| JwkError::InvalidRsaComponents {
                        kid: key_id.clone(),
                        source,
                    },
                )?;
                Ok(Self {
                    key_id,
                    algorithm: KeyAlgorithm::Rsa,
                    decoding_key,
                })
            }
            _ => Err(JwkError::NotRsa(key_id)),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Signing keys indexed by key ID.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, SigningKey>,
}

#[derive(Deserialize)]
struct RawJwkSet {
    #[serde(default)]
    keys: Vec<Value>,
}

impl KeySet {
    /// Build a key set from a JWKS document, skipping keys that cannot be used.
    pub fn from_jwks_document(document: Value) -> Result<Self, JwkError> {
        let raw: RawJwkSet = serde_json::from_value(document)?;

        let mut keys = HashMap::new();
        for value in raw.keys {
            let jwk: Jwk = match serde_json::from_value(value) {
                Ok(jwk) => jwk,
                Err(e) => {
                    debug!(error = %e, "Skipping unparseable JWK");
                    continue;
                }
            };
            match SigningKey::from_jwk(&jwk) {
                Ok(key) => {
                    keys.insert(key.key_id.clone(), key);
                }
                Err(e) => debug!(error = %e, "Skipping JWK"),
            }
        }

        Ok(Self { keys })
    }

    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

/// Where the store finds the JWKS document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwksEndpoint {
    /// OpenID discovery document URL; its `jwks_uri` is fetched next.
    Discovery(String),
    /// Fixed JWKS URL, no discovery round-trip.
    Static(String),
}

impl JwksEndpoint {
    /// Discovery endpoint for an issuer URL.
    pub fn for_issuer(issuer: &str) -> Self {
        JwksEndpoint::Discovery(format!(
            "{}{DISCOVERY_PATH}",
            issuer.trim_end_matches('/')
        ))
    }
}

/// Fetches JSON documents from the identity provider.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// GET `url` and parse the body as JSON.
    ///
    /// Transport failures, timeouts and non-success statuses are all
    /// [`AuthError::UpstreamUnavailable`].
    async fn fetch_json(&self, url: &str) -> Result<Value, AuthError>;
}

/// [`DocumentFetcher`] backed by `reqwest`.
#[derive(Clone)]
pub struct HttpDocumentFetcher {
    client: reqwest::Client,
}

impl HttpDocumentFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::UpstreamUnavailable(format!("HTTP client setup failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value, AuthError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::UpstreamUnavailable(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(format!("invalid JSON from {url}: {e}")))
    }
}

struct CacheEntry {
    keys: Arc<KeySet>,
    expires_at: Instant,
}

/// Outcome of the last refresh, guarded by the refresh lock.
#[derive(Default)]
struct RefreshState {
    last_attempt: Option<Instant>,
    last_error: Option<AuthError>,
}

/// Cached, lazily refreshed view of the identity provider's signing keys.
pub struct SigningKeyStore {
    endpoint: JwksEndpoint,
    fetcher: Arc<dyn DocumentFetcher>,
    cache_ttl: Duration,
    fetch_timeout: Duration,
    refresh_cooldown: Duration,
    cache: RwLock<Option<CacheEntry>>,
    /// Held for the duration of a refresh.
    refresh: Mutex<RefreshState>,
    /// Bumped each time a refresh finishes, successfully or not.
    generation: AtomicU64,
}

impl SigningKeyStore {
    pub fn new(endpoint: JwksEndpoint, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        Self {
            endpoint,
            fetcher,
            cache_ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            refresh_cooldown: DEFAULT_REFRESH_COOLDOWN,
            cache: RwLock::new(None),
            refresh: Mutex::new(RefreshState::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Bound on a whole key lookup, including the wait for a refresh
    /// already in flight.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    pub fn endpoint(&self) -> &JwksEndpoint {
        &self.endpoint
    }

    /// Current key set, refreshed first if empty or expired.
    ///
    /// Callers that queue behind a refresh take its outcome, error included,
    /// instead of starting their own.
    pub async fn get_keys(&self) -> Result<Arc<KeySet>, AuthError> {
        let seen = self.generation.load(Ordering::Acquire);
        if let Some(keys) = self.fresh_keys().await {
            return Ok(keys);
        }

        let deadline = Instant::now() + self.fetch_timeout;
        let mut state = self.lock_refresh(deadline).await?;
        if let Some(keys) = self.fresh_keys().await {
            return Ok(keys);
        }
        if self.generation.load(Ordering::Acquire) != seen {
            if let Some(err) = &state.last_error {
                return Err(err.clone());
            }
        }
        self.refresh_locked(&mut state, deadline).await
    }

    /// Signing key for `kid`. Never substitutes a different key.
    pub async fn get_key(&self, kid: &str) -> Result<SigningKey, AuthError> {
        let keys = self.get_keys().await?;
        if let Some(key) = keys.get(kid) {
            return Ok(key.clone());
        }

        let deadline = Instant::now() + self.fetch_timeout;
        let mut state = self.lock_refresh(deadline).await?;
        if let Some(key) = self.fresh_keys().await.and_then(|keys| keys.get(kid).cloned()) {
            return Ok(key);
        }

        let cooled_down = state
            .last_attempt
            .is_none_or(|at| at.elapsed() >= self.refresh_cooldown);
        if !cooled_down {
            return Err(AuthError::UnknownSigningKey(kid.to_string()));
        }

        debug!(kid, "Unknown kid, refreshing signing keys");
        let keys = self.refresh_locked(&mut state, deadline).await?;
        keys.get(kid)
            .cloned()
            .ok_or_else(|| AuthError::UnknownSigningKey(kid.to_string()))
    }

    /// Force refresh the key set.
    pub async fn refresh(&self) -> Result<Arc<KeySet>, AuthError> {
        let deadline = Instant::now() + self.fetch_timeout;
        let mut state = self.lock_refresh(deadline).await?;
        self.refresh_locked(&mut state, deadline).await
    }

    /// Check if a non-empty key set is cached and within its TTL.
    pub async fn is_cached(&self) -> bool {
        self.fresh_keys().await.is_some()
    }

    async fn fresh_keys(&self) -> Option<Arc<KeySet>> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|entry| Instant::now() < entry.expires_at && !entry.keys.is_empty())
            .map(|entry| Arc::clone(&entry.keys))
    }

    async fn lock_refresh(&self, deadline: Instant) -> Result<MutexGuard<'_, RefreshState>, AuthError> {
        tokio::time::timeout_at(deadline, self.refresh.lock())
            .await
            .map_err(|_| {
                AuthError::UpstreamUnavailable(format!(
                    "signing key refresh still in flight after {:?}",
                    self.fetch_timeout
                ))
            })
    }

    async fn refresh_locked(
        &self,
        state: &mut RefreshState,
        deadline: Instant,
    ) -> Result<Arc<KeySet>, AuthError> {
        let fetched = match tokio::time::timeout_at(deadline, self.fetch_key_set()).await {
            Ok(fetched) => fetched,
            Err(_) => Err(AuthError::UpstreamUnavailable(format!(
                "signing key refresh exceeded {:?}",
                self.fetch_timeout
            ))),
        };

        let now = Instant::now();
        state.last_attempt = Some(now);
        let outcome = match fetched {
            Ok(keys) => {
                let keys = Arc::new(keys);
                *self.cache.write().await = Some(CacheEntry {
                    keys: Arc::clone(&keys),
                    expires_at: now + self.cache_ttl,
                });
                state.last_error = None;
                Ok(keys)
            }
            Err(e) => {
                state.last_error = Some(e.clone());
                Err(e)
            }
        };
        self.generation.fetch_add(1, Ordering::Release);
        outcome
    }

    async fn fetch_key_set(&self) -> Result<KeySet, AuthError> {
        let jwks_uri = match &self.endpoint {
            JwksEndpoint::Static(url) => url.clone(),
            JwksEndpoint::Discovery(url) => {
                let discovery = self.fetcher.fetch_json(url).await?;
                jwks_uri_from_discovery(&discovery)?
            }
        };

        let document = self.fetcher.fetch_json(&jwks_uri).await?;
        let keys = KeySet::from_jwks_document(document).map_err(|e| {
            AuthError::UpstreamUnavailable(format!("JWKS at {jwks_uri} is invalid: {e}"))
        })?;

        info!(keys = keys.len(), jwks_uri = %jwks_uri, "Refreshed identity provider signing keys");
        Ok(keys)
    }
}

fn jwks_uri_from_discovery(discovery: &Value) -> Result<String, AuthError> {
    discovery
        .get("jwks_uri")
        .and_then(Value::as_str)
        .filter(|uri| !uri.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            AuthError::MalformedDiscoveryDocument("jwks_uri not found in OpenID configuration".into())
        })
}
