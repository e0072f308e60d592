use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

use super::session::IdTokenClaims;
use crate::config::Config;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Invalid token header: {0}")]
    Malformed(String),
    #[error("Unknown key ID: {0}")]
    UnknownKey(String),
    #[error("JWKS unavailable: {0}")]
    KeySet(String),
    #[error("Token validation failed: {0}")]
    Rejected(String),
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

struct JwksCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

/// RS256 ID-token verifier backed by the provider's published key set
pub struct IdTokenVerifier {
    jwks_uri: String,
    /// Accepted issuers: the configured value with and without a trailing slash
    expected_issuers: Vec<String>,
    /// Expected audience (the client_id)
    expected_audience: String,
    client: reqwest::Client,
    jwks_cache: RwLock<Option<JwksCache>>,
    cache_ttl: Duration,
}

impl IdTokenVerifier {
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        let trimmed = config.issuer.trim_end_matches('/').to_string();
        let expected_issuers = vec![trimmed.clone(), format!("{}/", trimmed)];

        tracing::info!(
            jwks_uri = %config.jwks_uri(),
            expected_issuers = ?expected_issuers,
            expected_audience = %config.client_id,
            jwks_cache_ttl_secs = config.jwks_cache_ttl_secs,
            "ID token verifier initialized"
        );

        Self {
            jwks_uri: config.jwks_uri(),
            expected_issuers,
            expected_audience: config.client_id.clone(),
            client,
            jwks_cache: RwLock::new(None),
            cache_ttl: Duration::from_secs(config.jwks_cache_ttl_secs),
        }
    }

    /// Verify signature, issuer and audience.
    ///
    /// Expiry is deliberately left to the caller: an expired but authentic token
    /// still tells the session endpoint that a refresh is due.
    pub async fn verify(&self, token: &str) -> Result<IdTokenClaims, VerificationError> {
        let header =
            decode_header(token).map_err(|e| VerificationError::Malformed(e.to_string()))?;
        let kid = header
            .kid
            .clone()
            .ok_or_else(|| VerificationError::Malformed("token missing kid".to_string()))?;

        let decoding_key = match self.get_cached_key(&kid).await? {
            Some(key) => key,
            None => {
                // Key rotation: the provider may have published a key we haven't seen
                tracing::warn!(kid = %kid, "Key ID not found in cache, forcing JWKS refresh");
                self.refresh_jwks().await?;

                match self.cached_key(&kid).await {
                    Some(key) => key,
                    None => {
                        let available_kids = self.cached_kids().await;
                        tracing::error!(
                            event = "id_token_unknown_kid",
                            kid = %kid,
                            available_kids = ?available_kids,
                            "Unknown key ID - kid not found in JWKS even after refresh"
                        );
                        return Err(VerificationError::UnknownKey(kid));
                    }
                }
            }
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.set_issuer(&self.expected_issuers);
        validation.set_audience(&[&self.expected_audience]);

        match decode::<IdTokenClaims>(token, &decoding_key, &validation) {
            Ok(data) => {
                tracing::debug!(sub = ?data.claims.sub, "ID token verified");
                Ok(data.claims)
            }
            Err(e) => {
                let token_hash = format!("{:x}", md5::compute(token));
                tracing::warn!(
                    event = "id_token_verification_failed",
                    error = ?e,
                    kid = %kid,
                    alg = ?header.alg,
                    token_hash = %token_hash,
                    token_len = token.len(),
                    "ID token verification failed"
                );
                Err(VerificationError::Rejected(e.to_string()))
            }
        }
    }

    /// Check if JWKS is cached (for health checks)
    pub async fn is_jwks_cached(&self) -> bool {
        self.jwks_cache.read().await.is_some()
    }

    /// Prefetch JWKS at startup so readiness passes immediately
    pub async fn prefetch_jwks(&self) -> Result<(), VerificationError> {
        tracing::info!("Prefetching JWKS at startup for readiness");
        self.refresh_jwks().await
    }

    async fn cached_key(&self, kid: &str) -> Option<DecodingKey> {
        let cache = self.jwks_cache.read().await;
        cache.as_ref().and_then(|c| c.keys.get(kid).cloned())
    }

    async fn cached_kids(&self) -> Vec<String> {
        let cache = self.jwks_cache.read().await;
        cache
            .as_ref()
            .map(|c| c.keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Get cached key, refreshing first when the cache is empty or stale
    async fn get_cached_key(&self, kid: &str) -> Result<Option<DecodingKey>, VerificationError> {
        {
            let cache = self.jwks_cache.read().await;
            if let Some(jwks_cache) = cache.as_ref() {
                if jwks_cache.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(jwks_cache.keys.get(kid).cloned());
                }
                tracing::info!(
                    elapsed_secs = jwks_cache.fetched_at.elapsed().as_secs(),
                    ttl_secs = self.cache_ttl.as_secs(),
                    "JWKS cache expired, will refresh"
                );
            }
        } // Lock is dropped here

        self.refresh_jwks().await?;
        Ok(self.cached_key(kid).await)
    }

    async fn refresh_jwks(&self) -> Result<(), VerificationError> {
        tracing::info!(url = %self.jwks_uri, "Fetching JWKS from provider");

        let response = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| VerificationError::KeySet(format!("fetch failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerificationError::KeySet(format!(
                "unexpected status {}",
                status.as_u16()
            )));
        }

        let jwks: JwksResponse = response
            .json()
            .await
            .map_err(|e| VerificationError::KeySet(format!("parse failed: {}", e)))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n, jwk.e) else {
                continue;
            };
            if jwk.kty != "RSA" {
                tracing::debug!(kid = %kid, kty = %jwk.kty, "Skipping non-RSA key");
                continue;
            }
            match DecodingKey::from_rsa_components(&n, &e) {
                Ok(key) => {
                    tracing::debug!(kid = %kid, "Added key to cache");
                    keys.insert(kid, key);
                }
                Err(err) => tracing::warn!(kid = %kid, error = %err, "Skipping unusable JWK"),
            }
        }

        tracing::info!(key_count = keys.len(), "JWKS fetched successfully");

        let mut cache = self.jwks_cache.write().await;
        *cache = Some(JwksCache {
            keys,
            fetched_at: Instant::now(),
        });

        Ok(())
    }
}
