// src/error.rs

use thiserror::Error;

/// The primary error type for the `aad-jwt` library.
#[derive(Debug, Error)]
pub enum AadJwtError {
    /// The discovery document or the JWKS could not be retrieved or parsed.
    #[error("Failed to retrieve {url}")]
    Retrieve {
        url: String,
        #[source]
        source: RetrieveCause,
    },

    /// The token references a key id that is not in the provider's key set.
    #[error("Unknown key id: {0}")]
    UnknownKey(String),

    /// The JWK has a key type other than RSA.
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// The JWK's RSA components could not be decoded into a public key.
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    /// The token is not a well-formed three-segment signed token.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The token failed signature, algorithm or claim verification.
    ///
    /// The display text never says which check failed. The reason is
    /// available through [`std::error::Error::source`].
    #[error("invalid token")]
    InvalidToken(#[source] TokenRejection),

    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The application's user store failed.
    #[error("User store error")]
    UserStore(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The underlying cause of an [`AadJwtError::Retrieve`].
#[derive(Debug, Error)]
pub enum RetrieveCause {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid JSON body: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Document is missing the required '{0}' field")]
    MissingField(&'static str),

    #[error("Document field '{field}' is not a valid URL: {source}")]
    InvalidField {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Why a token was rejected. Kept as the source of [`AadJwtError::InvalidToken`]
/// for logging; never part of the outward message.
#[derive(Debug, Error)]
pub enum TokenRejection {
    #[error("algorithm '{0}' is not allowed")]
    DisallowedAlgorithm(String),

    #[error("verification failed: {0}")]
    Verification(#[from] jsonwebtoken::errors::Error),

    #[error("issuer does not match the expected issuer")]
    IssuerMismatch,

    #[error("claim '{0}' is missing or has the wrong type")]
    MissingClaim(&'static str),

    #[error("claims do not match the requested type: {0}")]
    ClaimShape(serde_json::Error),
}

impl AadJwtError {
    pub(crate) fn retrieve(url: impl ToString, source: impl Into<RetrieveCause>) -> Self {
        AadJwtError::Retrieve {
            url: url.to_string(),
            source: source.into(),
        }
    }
}

impl From<TokenRejection> for AadJwtError {
    fn from(rejection: TokenRejection) -> Self {
        AadJwtError::InvalidToken(rejection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn invalid_token_message_does_not_leak_reason() {
        let err = AadJwtError::from(TokenRejection::IssuerMismatch);
        assert_eq!(err.to_string(), "invalid token");
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("issuer does not match the expected issuer".to_string())
        );
    }

    #[test]
    fn unknown_key_message_carries_kid() {
        let err = AadJwtError::UnknownKey("unknown-key-id".to_string());
        assert!(err.to_string().contains("unknown-key-id"));
    }
}
