// src/lib.rs

//! Validates Azure AD (Microsoft Entra ID) bearer tokens.
//!
//! The signing keys are found through OpenID Connect discovery for a tenant,
//! cached, and resolved by the `kid` in each token's header.

pub mod backend;
pub mod config;
pub mod crypto;
pub mod discovery;
pub mod error;
pub mod model;
pub mod resolver;
mod transport;
pub mod verifier;

/// The public prelude for the `aad-jwt` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::backend::{
        bearer_token_from_header, AuthenticatedUser, Authenticator, JwtUsers, UserClaims, UserStore,
    };
    pub use crate::config::{Config, ConfigBuilder, MissingUserAction, Settings};
    pub use crate::crypto::{jwk_to_public_key, jwk_to_rsa_pem, PublicKey};
    pub use crate::discovery::OpenIdDiscovery;
    pub use crate::error::{AadJwtError, RetrieveCause, TokenRejection};
    pub use crate::model::{DiscoveryDocument, JsonWebKey, JsonWebKeySet};
    pub use crate::resolver::KeyResolver;
    pub use crate::verifier::{Claims, TokenVerifier};
    pub use jsonwebtoken::Algorithm;
}
