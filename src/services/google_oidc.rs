// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Verification of Google Sign-In ID tokens.
//!
//! The credential posted by the frontend is a Google-signed ID token. Its
//! signature is checked against Google's published JWKS (discovered and
//! cached per `Cache-Control`), along with issuer, audience and expiry,
//! before any claim is trusted.

use crate::config::Config;
use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

const DISCOVERY_URL: &str = "https://accounts.google.com/.well-known/openid-configuration";
const DEFAULT_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

/// Identity asserted by a verified Google ID token.
#[derive(Debug, Clone)]
pub struct GoogleIdentity {
    /// Google account id (`sub`)
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// OIDC verification error categories.
#[derive(Debug, Clone)]
pub enum OidcError {
    /// The token is malformed, badly signed, or its claims do not match.
    Invalid(String),
    /// Google's key endpoints could not be reached.
    Transient(String),
}

#[derive(Clone)]
enum VerifierMode {
    Google,
    StaticKey {
        kid: String,
        algorithm: Algorithm,
        decoding_key: Arc<DecodingKey>,
    },
}

#[derive(Clone)]
struct DiscoveryCacheEntry {
    jwks_uri: String,
    expires_at: Instant,
}

#[derive(Clone)]
struct JwksCacheEntry {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Verifier for Google Sign-In ID tokens.
pub struct GoogleIdTokenVerifier {
    http_client: reqwest::Client,
    expected_audience: String,
    mode: VerifierMode,
    discovery_cache: RwLock<Option<DiscoveryCacheEntry>>,
    jwks_cache: RwLock<Option<JwksCacheEntry>>,
    refresh_lock: Mutex<()>,
}

impl GoogleIdTokenVerifier {
    /// Create a production verifier that discovers and caches Google JWKS keys.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::with_mode(config, VerifierMode::Google)
    }

    /// Create a verifier with a static key.
    ///
    /// This is intended for deterministic local/integration tests.
    pub fn new_with_static_key(
        config: &Config,
        kid: impl Into<String>,
        algorithm: Algorithm,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static OIDC kid must not be empty");
        }
        Self::with_mode(
            config,
            VerifierMode::StaticKey {
                kid,
                algorithm,
                decoding_key: Arc::new(decoding_key),
            },
        )
    }

    fn with_mode(config: &Config, mode: VerifierMode) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building OIDC HTTP client")?;

        let expected_audience = config.google.client_id.clone();
        tracing::info!(
            expected_audience = %expected_audience,
            "Initialized Google ID token verifier"
        );

        Ok(Self {
            http_client,
            expected_audience,
            mode,
            discovery_cache: RwLock::new(None),
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Verify a Google Sign-In credential.
    pub async fn verify(&self, credential: &str) -> Result<GoogleIdentity, OidcError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(OidcError::Invalid("credential is empty".to_string()));
        }

        let header = decode_header(credential)
            .map_err(|e| OidcError::Invalid(format!("invalid JWT header: {e}")))?;

        let expected_alg = match &self.mode {
            VerifierMode::Google => Algorithm::RS256,
            VerifierMode::StaticKey { algorithm, .. } => *algorithm,
        };
        if header.alg != expected_alg {
            return Err(OidcError::Invalid(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| OidcError::Invalid("missing JWT kid".to_string()))?;

        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let mut validation = Validation::new(expected_alg);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.set_audience(&[self.expected_audience.as_str()]);
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<GoogleIdTokenClaims>(credential, decoding_key.as_ref(), &validation)
            .map_err(|e| OidcError::Invalid(format!("JWT validation failed: {e}")))?
            .claims;

        if claims.email_verified == Some(false) {
            return Err(OidcError::Invalid(
                "email_verified claim is false".to_string(),
            ));
        }

        tracing::debug!(subject = %claims.sub, issuer = %claims.iss, "Google ID token verified");

        let expires_at = Utc
            .timestamp_opt(claims.exp as i64, 0)
            .single()
            .ok_or_else(|| OidcError::Invalid("exp claim out of range".to_string()))?;

        Ok(GoogleIdentity {
            subject: claims.sub,
            email: claims.email,
            name: claims.name,
            picture: claims.picture,
            expires_at,
        })
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, OidcError> {
        match &self.mode {
            VerifierMode::StaticKey {
                kid: static_kid,
                decoding_key,
                ..
            } => {
                if kid == static_kid {
                    return Ok(decoding_key.clone());
                }

                return Err(OidcError::Invalid(format!(
                    "unknown JWT kid for static verifier: {kid}"
                )));
            }
            VerifierMode::Google => {}
        }

        if let Some(key) = self.lookup_cached_key(kid).await {
            return Ok(key);
        }

        for force_refresh in [false, true] {
            self.refresh_jwks(force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(OidcError::Invalid(format!(
            "JWT kid not found in JWKS after refresh: {kid}"
        )))
    }

    async fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let now = Instant::now();
        self.jwks_cache
            .read()
            .await
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.keys_by_kid.get(kid).cloned())
    }

    /// Reload signing keys unless a fresh set is already cached.
    async fn refresh_jwks(&self, force_refresh: bool) -> Result<(), OidcError> {
        let _guard = self.refresh_lock.lock().await;

        let fresh = self
            .jwks_cache
            .read()
            .await
            .as_ref()
            .is_some_and(|entry| entry.expires_at > Instant::now());
        if fresh && !force_refresh {
            return Ok(());
        }

        let jwks_uri = self.resolve_jwks_uri(force_refresh).await?;
        tracing::debug!(jwks_uri = %jwks_uri, "Refreshing Google JWKS cache");

        let (jwks, ttl): (Jwks, Duration) = self.get_json(&jwks_uri).await?;
        let keys_by_kid: HashMap<String, Arc<DecodingKey>> = jwks
            .keys
            .into_iter()
            .filter(Jwk::is_rs256_signing_key)
            .filter_map(|jwk| match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => Some((jwk.kid, Arc::new(key))),
                Err(e) => {
                    tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
                    None
                }
            })
            .collect();

        if keys_by_kid.is_empty() {
            return Err(OidcError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.jwks_cache.write().await = Some(JwksCacheEntry {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        });
        tracing::debug!(ttl_secs = ttl.as_secs(), "Google JWKS cache refreshed");
        Ok(())
    }

    /// JWKS location from discovery, falling back to the last known or
    /// well-known URI when discovery is unavailable.
    async fn resolve_jwks_uri(&self, force_refresh: bool) -> Result<String, OidcError> {
        let cached = self.discovery_cache.read().await.clone();
        if let Some(entry) = &cached {
            if !force_refresh && entry.expires_at > Instant::now() {
                return Ok(entry.jwks_uri.clone());
            }
        }

        match self.get_json::<OpenIdConfig>(DISCOVERY_URL).await {
            Ok((discovery, ttl)) => {
                *self.discovery_cache.write().await = Some(DiscoveryCacheEntry {
                    jwks_uri: discovery.jwks_uri.clone(),
                    expires_at: Instant::now() + ttl,
                });
                Ok(discovery.jwks_uri)
            }
            Err(e) => {
                tracing::warn!(error = ?e, "OIDC discovery failed; using fallback JWKS URI");
                Ok(cached
                    .map(|entry| entry.jwks_uri)
                    .unwrap_or_else(|| DEFAULT_JWKS_URL.to_string()))
            }
        }
    }

    /// GET a JSON document along with its cache lifetime.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
    ) -> Result<(T, Duration), OidcError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| OidcError::Transient(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(OidcError::Transient(format!(
                "{url} returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);
        let body = response
            .json()
            .await
            .map_err(|e| OidcError::Transient(format!("invalid JSON from {url}: {e}")))?;
        Ok((body, ttl))
    }
}

#[derive(Debug, Deserialize)]
struct OpenIdConfig {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

impl Jwk {
    fn is_rs256_signing_key(&self) -> bool {
        self.kty == "RSA"
            && !self.kid.trim().is_empty()
            && self.alg.as_deref().map_or(true, |alg| alg == "RS256")
            && self.use_.as_deref().map_or(true, |u| u == "sig")
    }
}

#[derive(Debug, Deserialize)]
struct GoogleIdTokenClaims {
    iss: String,
    sub: String,
    exp: usize,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map_or(fallback, Duration::from_secs)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|raw| raw.trim_matches('"').parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cache_control_max_age_valid() {
        assert_eq!(
            parse_cache_control_max_age("public, max-age=3600"),
            Some(3600)
        );
        assert_eq!(parse_cache_control_max_age("max-age=60"), Some(60));
        assert_eq!(parse_cache_control_max_age("max-age=\"120\""), Some(120));
    }

    #[test]
    fn parse_cache_control_max_age_invalid() {
        assert_eq!(parse_cache_control_max_age("public, immutable"), None);
        assert_eq!(parse_cache_control_max_age("max-age=abc"), None);
        assert_eq!(parse_cache_control_max_age(""), None);
    }

    fn verifier() -> GoogleIdTokenVerifier {
        let config = Config::test_default("http://mock");
        GoogleIdTokenVerifier::new_with_static_key(
            &config,
            "test-kid",
            Algorithm::HS256,
            DecodingKey::from_secret(b"google-test-secret"),
        )
        .unwrap()
    }

    fn credential(aud: &str, exp_offset: i64) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("test-kid".to_string());
        let claims = serde_json::json!({
            "iss": "https://accounts.google.com",
            "aud": aud,
            "sub": "google-sub-1",
            "email": "alice@example.com",
            "email_verified": true,
            "name": "Alice",
            "exp": Utc::now().timestamp() + exp_offset,
        });
        encode(
            &header,
            &claims,
            &EncodingKey::from_secret(b"google-test-secret"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn verify_accepts_valid_credential() {
        let identity = verifier()
            .verify(&credential("google_client_id", 3600))
            .await
            .unwrap();
        assert_eq!(identity.subject, "google-sub-1");
        assert_eq!(identity.email.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn verify_rejects_wrong_audience() {
        let result = verifier().verify(&credential("someone-else", 3600)).await;
        assert!(matches!(result, Err(OidcError::Invalid(_))));
    }

    #[tokio::test]
    async fn verify_rejects_expired_credential() {
        let result = verifier()
            .verify(&credential("google_client_id", -3600))
            .await;
        assert!(matches!(result, Err(OidcError::Invalid(_))));
    }

    #[tokio::test]
    async fn verify_rejects_garbage() {
        assert!(matches!(
            verifier().verify("not-a-jwt").await,
            Err(OidcError::Invalid(_))
        ));
        assert!(matches!(
            verifier().verify("").await,
            Err(OidcError::Invalid(_))
        ));
    }
}
