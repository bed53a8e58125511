// src/resolver.rs

use crate::config::{Config, HttpDetails, KeySourceConfig};
use crate::crypto::{jwk_to_public_key, PublicKey};
use crate::discovery::OpenIdDiscovery;
use crate::error::{AadJwtError, RetrieveCause};
use crate::model::{JsonWebKey, JsonWebKeySet};
use crate::transport::HttpFetcher;
use moka::future::Cache;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

enum JwksLocation {
    Discovered(OpenIdDiscovery),
    Fixed(Url),
}

/// Fetches, caches and resolves the provider's signing keys.
///
/// The most recent successful key set is cached as a whole until
/// [`KeyResolver::invalidate`] is called. A lookup for a `kid` that is not in the
/// cached set triggers one refetch, which picks up rotated keys.
#[derive(Clone)]
pub struct KeyResolver {
    // The resolver is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

struct Inner {
    http: HttpFetcher,
    location: JwksLocation,
    // Single entry holding the whole set, so a refresh is one atomic swap.
    key_set: Cache<(), Arc<JsonWebKeySet>>,
}

impl KeyResolver {
    /// Creates a resolver from the config's key source.
    pub fn new(config: &Config) -> Result<Self, AadJwtError> {
        match &config.key_source {
            KeySourceConfig::JwksUri(url) => Self::from_jwks_uri(url.clone(), &config.http),
            KeySourceConfig::Tenant { .. } | KeySourceConfig::MetadataUrl(_) => {
                Ok(Self::from_discovery(OpenIdDiscovery::new(config)?))
            }
        }
    }

    /// Creates a resolver that finds the JWKS location through discovery.
    pub fn from_discovery(discovery: OpenIdDiscovery) -> Self {
        Self::with_location(discovery.http().clone(), JwksLocation::Discovered(discovery))
    }

    /// Creates a resolver that fetches keys from a fixed JWKS URL.
    pub fn from_jwks_uri(jwks_uri: Url, http: &HttpDetails) -> Result<Self, AadJwtError> {
        Ok(Self::with_location(HttpFetcher::new(http)?, JwksLocation::Fixed(jwks_uri)))
    }

    fn with_location(http: HttpFetcher, location: JwksLocation) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                location,
                key_set: Cache::builder().initial_capacity(1).build(),
            }),
        }
    }

    /// Fetches the current key set from the provider and replaces the cached set with it.
    ///
    /// # Errors
    ///
    /// Returns [`AadJwtError::Retrieve`] if discovery or the JWKS fetch fails, or if
    /// the discovered `jwks_uri` is not a URL.
    #[instrument(skip(self), err)]
    pub async fn get_keys(&self) -> Result<Arc<JsonWebKeySet>, AadJwtError> {
        let jwks_uri = self.jwks_uri().await?;
        let key_set: JsonWebKeySet = self.inner.http.get_json(&jwks_uri).await?;
        let key_set = Arc::new(key_set);

        info!("Fetched {} keys from {}", key_set.len(), jwks_uri);
        self.inner.key_set.insert((), key_set.clone()).await;
        Ok(key_set)
    }

    /// Retrieves the key with the given `kid`.
    ///
    /// Serves from the cached set when it holds the key, otherwise refetches
    /// once. The first matching entry wins if the set contains duplicates.
    ///
    /// # Errors
    ///
    /// * [`AadJwtError::UnknownKey`] if the refreshed set does not contain `kid`.
    /// * [`AadJwtError::Retrieve`] if the refetch fails.
    #[instrument(skip(self), err)]
    pub async fn get_key(&self, kid: &str) -> Result<JsonWebKey, AadJwtError> {
        if let Some(jwk) = self.cached_keys().await.and_then(|set| set.find(kid).cloned()) {
            debug!("JWK cache hit for kid: {}", kid);
            return Ok(jwk);
        }

        debug!("JWK cache miss for kid: {}. Fetching from provider.", kid);
        self.get_keys()
            .await?
            .find(kid)
            .cloned()
            .ok_or_else(|| AadJwtError::UnknownKey(kid.to_string()))
    }

    /// Retrieves the key with the given `kid` and converts it to a [`PublicKey`].
    pub async fn get_public_key(&self, kid: &str) -> Result<PublicKey, AadJwtError> {
        let jwk = self.get_key(kid).await?;
        jwk_to_public_key(&jwk)
    }

    /// The cached key set, if one has been fetched.
    pub async fn cached_keys(&self) -> Option<Arc<JsonWebKeySet>> {
        self.inner.key_set.get(&()).await
    }

    /// Drops the cached key set. The next lookup fetches a fresh one.
    pub async fn invalidate(&self) {
        self.inner.key_set.invalidate(&()).await;
    }

    /// The discovery client, when the JWKS location is discovered.
    pub fn discovery(&self) -> Option<&OpenIdDiscovery> {
        match &self.inner.location {
            JwksLocation::Discovered(discovery) => Some(discovery),
            JwksLocation::Fixed(_) => None,
        }
    }

    async fn jwks_uri(&self) -> Result<Url, AadJwtError> {
        match &self.inner.location {
            JwksLocation::Fixed(url) => Ok(url.clone()),
            JwksLocation::Discovered(discovery) => {
                let document = discovery.get_configuration().await?;
                Url::parse(&document.jwks_uri).map_err(|source| {
                    AadJwtError::retrieve(
                        discovery.metadata_endpoint(),
                        RetrieveCause::InvalidField { field: "jwks_uri", source },
                    )
                })
            }
        }
    }
}
