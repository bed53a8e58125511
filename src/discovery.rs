// src/discovery.rs

use crate::config::{Config, KeySourceConfig};
use crate::error::{AadJwtError, RetrieveCause};
use crate::model::DiscoveryDocument;
use crate::transport::HttpFetcher;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

/// Where a discovery client finds the OpenID configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySource {
    /// An Azure AD tenant under the given authority.
    Tenant { authority: Url, tenant_id: String },
    /// A fully-formed metadata document URL.
    MetadataUrl(Url),
}

/// Fetches a provider's OpenID configuration.
///
/// Every call to [`OpenIdDiscovery::get_configuration`] issues a fresh request;
/// caching is left to the [`KeyResolver`](crate::resolver::KeyResolver).
#[derive(Clone)]
pub struct OpenIdDiscovery {
    inner: Arc<Inner>,
}

struct Inner {
    http: HttpFetcher,
    metadata_endpoint: Url,
}

impl OpenIdDiscovery {
    /// Creates a discovery client from the config's key source.
    ///
    /// # Errors
    ///
    /// Returns [`AadJwtError::InvalidConfiguration`] if the config points straight at a JWKS URI.
    pub fn new(config: &Config) -> Result<Self, AadJwtError> {
        let source = match &config.key_source {
            KeySourceConfig::Tenant { authority, tenant_id } => DiscoverySource::Tenant {
                authority: authority.clone(),
                tenant_id: tenant_id.clone(),
            },
            KeySourceConfig::MetadataUrl(url) => DiscoverySource::MetadataUrl(url.clone()),
            KeySourceConfig::JwksUri(_) => {
                return Err(AadJwtError::InvalidConfiguration(
                    "discovery is not used when a jwks_uri is configured".to_string(),
                ))
            }
        };
        Self::with_source(source, HttpFetcher::new(&config.http)?)
    }

    pub(crate) fn with_source(source: DiscoverySource, http: HttpFetcher) -> Result<Self, AadJwtError> {
        let metadata_endpoint = make_metadata_endpoint(&source)?;
        Ok(Self {
            inner: Arc::new(Inner { http, metadata_endpoint }),
        })
    }

    pub(crate) fn http(&self) -> &HttpFetcher {
        &self.inner.http
    }

    /// The URL of the OpenID configuration document.
    pub fn metadata_endpoint(&self) -> &Url {
        &self.inner.metadata_endpoint
    }

    /// Fetches and parses the OpenID configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`AadJwtError::Retrieve`] on transport failures, non-2xx responses,
    /// bodies that are not JSON objects and documents without a `jwks_uri`.
    #[instrument(skip(self), fields(endpoint = %self.inner.metadata_endpoint), err)]
    pub async fn get_configuration(&self) -> Result<DiscoveryDocument, AadJwtError> {
        let endpoint = &self.inner.metadata_endpoint;
        let document: Value = self.inner.http.get_json(endpoint).await?;

        if document.get("jwks_uri").and_then(Value::as_str).is_none() {
            return Err(AadJwtError::retrieve(endpoint, RetrieveCause::MissingField("jwks_uri")));
        }
        let document: DiscoveryDocument =
            serde_json::from_value(document).map_err(|e| AadJwtError::retrieve(endpoint, e))?;

        debug!("Discovered JWKS URI: {}", document.jwks_uri);
        Ok(document)
    }
}

/// Builds the metadata URL for a discovery source.
///
/// Tenants map to `{authority}/{tenant_id}/v2.0/.well-known/openid-configuration`.
pub fn make_metadata_endpoint(source: &DiscoverySource) -> Result<Url, AadJwtError> {
    match source {
        DiscoverySource::MetadataUrl(url) => Ok(url.clone()),
        DiscoverySource::Tenant { authority, tenant_id } => {
            let mut url = authority.clone();
            url.path_segments_mut()
                .map_err(|_| AadJwtError::InvalidUrl(format!("{} cannot be a base URL", authority)))?
                .pop_if_empty()
                .extend([tenant_id.as_str(), "v2.0", ".well-known", "openid-configuration"]);
            Ok(url)
        }
    }
}
