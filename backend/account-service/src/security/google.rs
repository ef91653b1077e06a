//! Federated sign-in credential verification.
//!
//! Google issues an RS256-signed ID token; we verify it against Google's
//! published JWKS. The key cache lives on the verifier instance so tests can
//! substitute the whole trait without touching process globals.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::error::{AccountError, Result};

const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];
const JWKS_CACHE_TTL_SECS: i64 = 3600;
const CLOCK_SKEW_LEEWAY_SECS: u64 = 60;

/// Identity asserted by the provider after signature verification.
#[derive(Debug, Clone)]
pub struct FederatedClaims {
    /// Provider-scoped stable subject id.
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait FederatedTokenVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<FederatedClaims>;
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

/// Individual RSA key from the provider's key set.
#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Default)]
struct JwksCache {
    keys: HashMap<String, Jwk>,
    fetched_at: Option<DateTime<Utc>>,
}

impl JwksCache {
    fn is_expired(&self) -> bool {
        match self.fetched_at {
            Some(t) => Utc::now() - t > Duration::seconds(JWKS_CACHE_TTL_SECS),
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleIdTokenClaims {
    iss: String,
    sub: String,
    email: String,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

pub struct GoogleTokenVerifier {
    client_id: String,
    http: Client,
    cache: RwLock<JwksCache>,
}

impl GoogleTokenVerifier {
    pub fn new(client_id: String) -> Self {
        Self {
            client_id,
            http: Client::new(),
            cache: RwLock::new(JwksCache::default()),
        }
    }

    async fn fetch_jwks(&self) -> Result<Vec<Jwk>> {
        debug!("Fetching Google JWKS from {}", GOOGLE_JWKS_URL);

        let response = self
            .http
            .get(GOOGLE_JWKS_URL)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to fetch Google JWKS: {}", e);
                AccountError::InvalidFederatedToken
            })?;

        if !response.status().is_success() {
            error!("Google JWKS request failed with status: {}", response.status());
            return Err(AccountError::InvalidFederatedToken);
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Google JWKS response: {}", e);
            AccountError::InvalidFederatedToken
        })?;

        Ok(jwks.keys)
    }

    /// Look up the signing key by key id, using the cache when fresh.
    async fn public_key(&self, kid: &str) -> Result<Jwk> {
        {
            let cache = self.cache.read().await;
            if !cache.is_expired() {
                if let Some(key) = cache.keys.get(kid) {
                    debug!("Using cached Google public key for kid={}", kid);
                    return Ok(key.clone());
                }
            }
        }

        let keys = self.fetch_jwks().await?;

        let mut cache = self.cache.write().await;
        cache.keys.clear();
        for key in keys {
            cache.keys.insert(key.kid.clone(), key);
        }
        cache.fetched_at = Some(Utc::now());

        cache.keys.get(kid).cloned().ok_or_else(|| {
            error!("Google public key not found for kid={}", kid);
            AccountError::InvalidFederatedToken
        })
    }
}

#[async_trait]
impl FederatedTokenVerifier for GoogleTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<FederatedClaims> {
        let header = decode_header(credential).map_err(|e| {
            debug!("Failed to decode federated token header: {}", e);
            AccountError::InvalidFederatedToken
        })?;

        if header.alg != Algorithm::RS256 {
            error!("Federated token uses unexpected algorithm: {:?}", header.alg);
            return Err(AccountError::InvalidFederatedToken);
        }

        let kid = header.kid.ok_or(AccountError::InvalidFederatedToken)?;
        let jwk = self.public_key(&kid).await?;

        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|_| AccountError::InvalidFederatedToken)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.client_id]);
        validation.leeway = CLOCK_SKEW_LEEWAY_SECS;

        let data = decode::<GoogleIdTokenClaims>(credential, &key, &validation).map_err(|e| {
            debug!("Federated token validation failed: {}", e);
            AccountError::InvalidFederatedToken
        })?;
        let claims = data.claims;

        if !GOOGLE_ISSUERS.contains(&claims.iss.as_str()) {
            error!("Federated token from unexpected issuer: {}", claims.iss);
            return Err(AccountError::InvalidFederatedToken);
        }

        Ok(FederatedClaims {
            subject: claims.sub,
            email: claims.email,
            email_verified: claims.email_verified,
            name: claims.name,
            picture: claims.picture,
        })
    }
}
