// src/config.rs

use crate::error::AadJwtError;
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// The Azure AD public cloud authority.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// The realm advertised in `WWW-Authenticate` challenges when none is configured.
pub const DEFAULT_REALM: &str = "api";

/// Where signing keys come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySourceConfig {
    /// Discover the JWKS location from a tenant's OpenID configuration.
    Tenant { authority: Url, tenant_id: String },
    /// Discover the JWKS location from an explicit metadata document URL.
    MetadataUrl(Url),
    /// Fetch keys directly from a JWKS URL, bypassing discovery.
    JwksUri(Url),
}

/// Contains the validation settings applied to bearer tokens.
#[derive(Debug, Clone)]
pub struct ValidationDetails {
    /// The signing algorithms that are permitted. Tokens signed with any other
    /// algorithm are rejected before any key is fetched.
    pub algorithms: Vec<Algorithm>,
    /// The tolerance for clock skew when validating `exp` and `nbf`.
    pub leeway: Duration,
    /// Accepted `aud` values. Empty disables audience validation.
    pub audience: Vec<String>,
    /// Expected `iss`. May contain `{tenantid}`, which is replaced by the token's `tid` claim.
    pub issuer: Option<String>,
}

impl Default for ValidationDetails {
    fn default() -> Self {
        Self {
            algorithms: vec![Algorithm::RS256],
            leeway: Duration::from_secs(60),
            audience: Vec::new(),
            issuer: None,
        }
    }
}

/// HTTP settings shared by discovery and JWKS fetches.
#[derive(Debug, Clone)]
pub struct HttpDetails {
    /// Accept invalid TLS certificates. Only ever enabled explicitly.
    pub danger_accept_invalid_certs: bool,
    /// Per-request timeout. `None` means no timeout.
    pub request_timeout: Option<Duration>,
    /// Retries for connect and timeout errors. HTTP error statuses are never retried.
    pub max_retries: u32,
}

impl Default for HttpDetails {
    fn default() -> Self {
        Self {
            danger_accept_invalid_certs: false,
            request_timeout: Some(Duration::from_secs(10)),
            max_retries: 2,
        }
    }
}

/// What to do when a verified token belongs to a user the application does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingUserAction {
    /// Create the user from the token's claims.
    Create,
    /// Do not authenticate the request.
    #[default]
    Ignore,
}

/// The main configuration for the `aad-jwt` components.
///
/// Construct it with [`ConfigBuilder`] or from [`Settings`].
#[derive(Debug, Clone)]
pub struct Config {
    pub key_source: KeySourceConfig,
    pub validation: ValidationDetails,
    pub http: HttpDetails,
    pub missing_user_action: MissingUserAction,
    pub realm: String,
}

/// A builder for creating a `Config` instance.
#[derive(Default)]
pub struct ConfigBuilder {
    tenant_id: Option<String>,
    authority: Option<Url>,
    metadata_url: Option<Url>,
    jwks_uri: Option<Url>,
    validation: ValidationDetails,
    http: HttpDetails,
    missing_user_action: MissingUserAction,
    realm: Option<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Azure AD tenant id (a GUID, a verified domain, or `common`).
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Overrides the login authority used with a tenant id, e.g. for sovereign clouds.
    pub fn authority(mut self, url: &str) -> Result<Self, AadJwtError> {
        self.authority = Some(parse_url(url)?);
        Ok(self)
    }

    /// Sets an explicit OpenID configuration URL instead of a tenant id.
    pub fn metadata_url(mut self, url: &str) -> Result<Self, AadJwtError> {
        self.metadata_url = Some(parse_url(url)?);
        Ok(self)
    }

    /// Sets an explicit JWKS URI, bypassing OpenID discovery.
    pub fn jwks_uri(mut self, url: &str) -> Result<Self, AadJwtError> {
        self.jwks_uri = Some(parse_url(url)?);
        Ok(self)
    }

    /// Sets the allowed signing algorithms. Defaults to `[Algorithm::RS256]`.
    pub fn algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.validation.algorithms = algorithms;
        self
    }

    /// Sets the clock skew tolerance. Defaults to 60 seconds.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.validation.leeway = leeway;
        self
    }

    /// Adds an accepted audience. Can be called more than once.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.validation.audience.push(audience.into());
        self
    }

    /// Sets the expected issuer.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.validation.issuer = Some(issuer.into());
        self
    }

    /// Disables TLS certificate verification for discovery and JWKS requests.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.http.danger_accept_invalid_certs = accept;
        self
    }

    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.http.request_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.http.max_retries = retries;
        self
    }

    pub fn missing_user_action(mut self, action: MissingUserAction) -> Self {
        self.missing_user_action = action;
        self
    }

    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns an error if no key source is configured, if both a tenant id and a
    /// metadata URL are set, or if the algorithm allow-list is empty or contains
    /// a non-RSA algorithm.
    pub fn build(self) -> Result<Config, AadJwtError> {
        let key_source = match (self.jwks_uri, self.metadata_url, self.tenant_id) {
            (_, Some(_), Some(_)) => {
                return Err(AadJwtError::InvalidConfiguration(
                    "tenant_id and metadata_url are mutually exclusive".to_string(),
                ))
            }
            (Some(jwks_uri), _, _) => KeySourceConfig::JwksUri(jwks_uri),
            (None, Some(metadata_url), None) => KeySourceConfig::MetadataUrl(metadata_url),
            (None, None, Some(tenant_id)) => {
                if tenant_id.trim().is_empty() {
                    return Err(AadJwtError::InvalidConfiguration("tenant_id is empty".to_string()));
                }
                let authority = match self.authority {
                    Some(authority) => authority,
                    None => parse_url(DEFAULT_AUTHORITY)?,
                };
                KeySourceConfig::Tenant { authority, tenant_id }
            }
            (None, None, None) => {
                return Err(AadJwtError::MissingConfiguration(
                    "tenant_id, metadata_url or jwks_uri".to_string(),
                ))
            }
        };

        if self.validation.algorithms.is_empty() {
            return Err(AadJwtError::InvalidConfiguration(
                "at least one signing algorithm must be allowed".to_string(),
            ));
        }
        if let Some(alg) = self.validation.algorithms.iter().find(|alg| !is_rsa(**alg)) {
            return Err(AadJwtError::InvalidConfiguration(format!(
                "algorithm {:?} is not an RSA algorithm",
                alg
            )));
        }

        Ok(Config {
            key_source,
            validation: self.validation,
            http: self.http,
            missing_user_action: self.missing_user_action,
            realm: self.realm.unwrap_or_else(|| DEFAULT_REALM.to_string()),
        })
    }
}

fn parse_url(url: &str) -> Result<Url, AadJwtError> {
    Url::parse(url).map_err(|e| AadJwtError::InvalidUrl(format!("{}: {}", url, e)))
}

fn is_rsa(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 | Algorithm::PS256 | Algorithm::PS384 | Algorithm::PS512
    )
}

/// Plain-value settings, typically loaded from a YAML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub tenant_id: Option<String>,
    pub authority: Option<String>,
    pub metadata_url: Option<String>,
    pub jwks_uri: Option<String>,
    pub algorithms: Option<Vec<String>>,
    #[serde(default)]
    pub audience: Vec<String>,
    pub issuer: Option<String>,
    pub leeway_seconds: Option<u64>,
    #[serde(default)]
    pub danger_accept_invalid_certs: bool,
    pub request_timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub missing_user_action: MissingUserAction,
    pub realm: Option<String>,
}

impl Settings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, AadJwtError> {
        serde_yaml::from_str(yaml).map_err(|e| AadJwtError::InvalidConfiguration(e.to_string()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, AadJwtError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            AadJwtError::InvalidConfiguration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Validates the settings and turns them into a [`Config`].
    pub fn into_config(self) -> Result<Config, AadJwtError> {
        let mut builder = ConfigBuilder::new()
            .danger_accept_invalid_certs(self.danger_accept_invalid_certs)
            .missing_user_action(self.missing_user_action);

        if let Some(tenant_id) = self.tenant_id {
            builder = builder.tenant_id(tenant_id);
        }
        if let Some(authority) = &self.authority {
            builder = builder.authority(authority)?;
        }
        if let Some(metadata_url) = &self.metadata_url {
            builder = builder.metadata_url(metadata_url)?;
        }
        if let Some(jwks_uri) = &self.jwks_uri {
            builder = builder.jwks_uri(jwks_uri)?;
        }
        if let Some(names) = &self.algorithms {
            let algorithms = names
                .iter()
                .map(|name| {
                    Algorithm::from_str(name)
                        .map_err(|_| AadJwtError::InvalidConfiguration(format!("unknown algorithm: {}", name)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            builder = builder.algorithms(algorithms);
        }
        for audience in self.audience {
            builder = builder.audience(audience);
        }
        if let Some(issuer) = self.issuer {
            builder = builder.issuer(issuer);
        }
        if let Some(leeway) = self.leeway_seconds {
            builder = builder.leeway(Duration::from_secs(leeway));
        }
        if let Some(timeout) = self.request_timeout_seconds {
            builder = builder.request_timeout(Some(Duration::from_secs(timeout)));
        }
        if let Some(retries) = self.max_retries {
            builder = builder.max_retries(retries);
        }
        if let Some(realm) = self.realm {
            builder = builder.realm(realm);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_config_defaults() {
        let config = ConfigBuilder::new().tenant_id("some-tenant-id").build().unwrap();

        assert_eq!(
            config.key_source,
            KeySourceConfig::Tenant {
                authority: Url::parse(DEFAULT_AUTHORITY).unwrap(),
                tenant_id: "some-tenant-id".to_string(),
            }
        );
        assert_eq!(config.validation.algorithms, vec![Algorithm::RS256]);
        assert!(!config.http.danger_accept_invalid_certs);
        assert_eq!(config.missing_user_action, MissingUserAction::Ignore);
        assert_eq!(config.realm, DEFAULT_REALM);
    }

    #[test]
    fn requires_a_key_source() {
        assert!(matches!(
            ConfigBuilder::new().build(),
            Err(AadJwtError::MissingConfiguration(_))
        ));
    }

    #[test]
    fn tenant_and_metadata_url_are_exclusive() {
        let result = ConfigBuilder::new()
            .tenant_id("t")
            .metadata_url("https://login.example/.well-known/openid-configuration")
            .unwrap()
            .build();
        assert!(matches!(result, Err(AadJwtError::InvalidConfiguration(_))));
    }

    #[test]
    fn jwks_uri_takes_precedence_over_discovery() {
        let config = ConfigBuilder::new()
            .tenant_id("t")
            .jwks_uri("https://keys.example/jwks")
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(config.key_source, KeySourceConfig::JwksUri(_)));
    }

    #[test]
    fn rejects_symmetric_and_empty_algorithm_lists() {
        let hs = ConfigBuilder::new().tenant_id("t").algorithms(vec![Algorithm::HS256]).build();
        assert!(matches!(hs, Err(AadJwtError::InvalidConfiguration(_))));

        let empty = ConfigBuilder::new().tenant_id("t").algorithms(vec![]).build();
        assert!(matches!(empty, Err(AadJwtError::InvalidConfiguration(_))));
    }

    #[test]
    fn rejects_unparseable_urls() {
        assert!(matches!(
            ConfigBuilder::new().jwks_uri("not a url"),
            Err(AadJwtError::InvalidUrl(_))
        ));
    }

    #[test]
    fn settings_from_yaml() {
        let settings = Settings::from_yaml_str(
            r#"
tenant_id: contoso.onmicrosoft.com
algorithms: [RS256, RS384]
audience: ["api://my-api"]
issuer: "https://login.microsoftonline.com/{tenantid}/v2.0"
leeway_seconds: 5
missing_user_action: create
realm: contoso
"#,
        )
        .unwrap();
        let config = settings.into_config().unwrap();

        assert_eq!(config.validation.algorithms, vec![Algorithm::RS256, Algorithm::RS384]);
        assert_eq!(config.validation.audience, vec!["api://my-api".to_string()]);
        assert_eq!(config.validation.leeway, Duration::from_secs(5));
        assert_eq!(config.missing_user_action, MissingUserAction::Create);
        assert_eq!(config.realm, "contoso");
    }

    #[test]
    fn settings_reject_unknown_algorithms() {
        let settings = Settings::from_yaml_str("tenant_id: t\nalgorithms: [none]\n").unwrap();
        assert!(matches!(settings.into_config(), Err(AadJwtError::InvalidConfiguration(_))));
    }
}
