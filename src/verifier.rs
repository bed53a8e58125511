// src/verifier.rs

use crate::config::{Config, ValidationDetails};
use crate::error::{AadJwtError, TokenRejection};
use crate::resolver::KeyResolver;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

const TENANT_PLACEHOLDER: &str = "{tenantid}";

/// The claims of a verified token.
///
/// Only [`TokenVerifier`] constructs these, after the signature and the
/// standard claims have been checked.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub(crate) fn from_verified(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns the claim if it is a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    pub fn issuer(&self) -> Option<&str> {
        self.get_str("iss")
    }

    /// The Azure AD tenant (`tid`) the token was issued for.
    pub fn tenant_id(&self) -> Option<&str> {
        self.get_str("tid")
    }

    /// The Azure AD object id (`oid`) of the principal.
    pub fn object_id(&self) -> Option<&str> {
        self.get_str("oid")
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.0.get("exp").and_then(Value::as_u64)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// The fields read from a token header before its signature is checked.
#[derive(Debug, Deserialize)]
struct UnverifiedHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// Verifies Azure AD bearer tokens.
///
/// Create it once and reuse it for all requests; clones share the key cache.
#[derive(Clone)]
pub struct TokenVerifier {
    inner: Arc<Inner>,
}

struct Inner {
    resolver: KeyResolver,
    validation: ValidationDetails,
}

impl TokenVerifier {
    /// Creates a verifier, and the key resolver it uses, from the given configuration.
    pub fn new(config: &Config) -> Result<Self, AadJwtError> {
        Ok(Self::with_resolver(KeyResolver::new(config)?, config.validation.clone()))
    }

    pub fn with_resolver(resolver: KeyResolver, validation: ValidationDetails) -> Self {
        Self {
            inner: Arc::new(Inner { resolver, validation }),
        }
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.inner.resolver
    }

    /// Verifies a bearer token and returns its claims.
    ///
    /// 1. The header is decoded without verification to read `alg` and `kid`.
    /// 2. `alg` must be in the configured allow-list.
    /// 3. The signing key is resolved by `kid` and converted to a public key.
    /// 4. The signature, `exp`, `nbf` and the configured `aud`/`iss` are checked.
    ///
    /// # Errors
    ///
    /// * [`AadJwtError::MalformedToken`] if the token is not three base64url segments
    ///   or its header cannot be parsed.
    /// * [`AadJwtError::InvalidToken`] on algorithm, signature or claim failures.
    /// * [`AadJwtError::UnknownKey`], [`AadJwtError::Retrieve`] from key resolution.
    /// * [`AadJwtError::UnsupportedKeyType`], [`AadJwtError::MalformedKey`] from key conversion.
    #[instrument(skip(self, token), err)]
    pub async fn verify(&self, token: &str) -> Result<Claims, AadJwtError> {
        let header = parse_unverified_header(token)?;
        let alg = self.allowed_algorithm(&header.alg).map_err(log_rejection)?;
        let kid = header
            .kid
            .ok_or_else(|| AadJwtError::MalformedToken("header has no 'kid'".to_string()))?;

        let public_key = self.inner.resolver.get_public_key(&kid).await?;
        let decoding_key = public_key.decoding_key()?;

        let validation = self.build_validation(alg);
        let token_data = decode::<Map<String, Value>>(token, &decoding_key, &validation)
            .map_err(|e| log_rejection(TokenRejection::Verification(e)))?;

        let claims = token_data.claims;
        self.check_templated_issuer(&claims).map_err(log_rejection)?;

        debug!(thumbprint = %public_key.thumbprint(), "Token verified for kid: {}", kid);
        Ok(Claims::from_verified(claims))
    }

    /// Verifies a bearer token and deserializes its claims into `T`.
    pub async fn verify_as<T: DeserializeOwned>(&self, token: &str) -> Result<T, AadJwtError> {
        let claims = self.verify(token).await?;
        serde_json::from_value(Value::Object(claims.into_map()))
            .map_err(|e| AadJwtError::InvalidToken(TokenRejection::ClaimShape(e)))
    }

    fn allowed_algorithm(&self, name: &str) -> Result<Algorithm, TokenRejection> {
        Algorithm::from_str(name)
            .ok()
            .filter(|alg| self.inner.validation.algorithms.contains(alg))
            .ok_or_else(|| TokenRejection::DisallowedAlgorithm(name.to_string()))
    }

    fn build_validation(&self, alg: Algorithm) -> Validation {
        let details = &self.inner.validation;
        let mut validation = Validation::new(alg);
        validation.leeway = details.leeway.as_secs();
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp"]);

        if details.audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&details.audience);
        }

        if let Some(issuer) = &details.issuer {
            // Templated issuers are checked after decoding, once `tid` is known.
            if !issuer.contains(TENANT_PLACEHOLDER) {
                validation.set_issuer(&[issuer]);
            }
        }
        validation
    }

    fn check_templated_issuer(&self, claims: &Map<String, Value>) -> Result<(), TokenRejection> {
        let template = match &self.inner.validation.issuer {
            Some(template) if template.contains(TENANT_PLACEHOLDER) => template,
            _ => return Ok(()),
        };

        let tid = claims
            .get("tid")
            .and_then(Value::as_str)
            .ok_or(TokenRejection::MissingClaim("tid"))?;
        let iss = claims
            .get("iss")
            .and_then(Value::as_str)
            .ok_or(TokenRejection::MissingClaim("iss"))?;

        if iss == template.replace(TENANT_PLACEHOLDER, tid) {
            Ok(())
        } else {
            Err(TokenRejection::IssuerMismatch)
        }
    }
}

fn parse_unverified_header(token: &str) -> Result<UnverifiedHeader, AadJwtError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AadJwtError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(segments[0])
        .map_err(|e| AadJwtError::MalformedToken(format!("header is not base64url: {}", e)))?;
    for (name, segment) in [("payload", segments[1]), ("signature", segments[2])] {
        URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|e| AadJwtError::MalformedToken(format!("{} is not base64url: {}", name, e)))?;
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| AadJwtError::MalformedToken(format!("header is not valid JSON: {}", e)))
}

fn log_rejection(rejection: TokenRejection) -> AadJwtError {
    debug!("Token rejected: {}", rejection);
    AadJwtError::InvalidToken(rejection)
}
