// src/backend.rs

//! Framework-agnostic glue from verified tokens to application users.
//!
//! The host application supplies a [`UserStore`]; [`Authenticator`] extracts and
//! verifies the bearer token, maps its claims to a user and applies the
//! missing-user and active-user policies.

use crate::config::{Config, MissingUserAction};
use crate::error::{AadJwtError, TokenRejection};
use crate::verifier::{Claims, TokenVerifier};
use async_trait::async_trait;
use tracing::{debug, info, instrument};

/// A user record the application can authenticate.
pub trait AuthenticatedUser {
    fn username(&self) -> &str;

    /// Inactive users are never authenticated. Users are active unless they say otherwise.
    fn is_active(&self) -> bool {
        true
    }
}

/// Storage for application users, implemented by the host application.
#[async_trait]
pub trait UserStore: Send + Sync {
    type User: AuthenticatedUser + Send;

    async fn find_by_username(&self, username: &str) -> Result<Option<Self::User>, AadJwtError>;

    async fn create_for_claims(&self, claims: &UserClaims) -> Result<Self::User, AadJwtError>;
}

/// The user-identifying subset of a token's claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserClaims {
    pub username: String,
    pub object_id: Option<String>,
    pub tenant_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserClaims {
    /// Claims tried, in order, for the username.
    pub const USERNAME_CLAIMS: [&'static str; 4] = ["preferred_username", "upn", "email", "sub"];

    pub fn from_claims(claims: &Claims) -> Result<Self, AadJwtError> {
        let username = Self::USERNAME_CLAIMS
            .iter()
            .find_map(|name| claims.get_str(name).filter(|value| !value.is_empty()))
            .ok_or(AadJwtError::InvalidToken(TokenRejection::MissingClaim("preferred_username")))?;

        let owned = |name: &str| claims.get_str(name).map(str::to_string);
        Ok(Self {
            username: username.to_string(),
            object_id: owned("oid"),
            tenant_id: owned("tid"),
            name: owned("name"),
            email: owned("email"),
        })
    }
}

/// Looks up, and optionally creates, the user a token belongs to.
pub struct JwtUsers<S> {
    store: S,
    missing_user_action: MissingUserAction,
}

impl<S: UserStore> JwtUsers<S> {
    pub fn new(store: S, missing_user_action: MissingUserAction) -> Self {
        Self {
            store,
            missing_user_action,
        }
    }

    pub fn create_missing(&self) -> bool {
        self.missing_user_action == MissingUserAction::Create
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the existing user for `claims`, creating it if allowed.
    pub async fn get_for_claims(&self, claims: &UserClaims) -> Result<Option<S::User>, AadJwtError> {
        if let Some(user) = self.store.find_by_username(&claims.username).await? {
            return Ok(Some(user));
        }
        if !self.create_missing() {
            debug!("No user named {} and creation is disabled", claims.username);
            return Ok(None);
        }

        info!("Creating user {} from token claims", claims.username);
        self.store.create_for_claims(claims).await.map(Some)
    }
}

/// Authenticates requests carrying Azure AD bearer tokens.
pub struct Authenticator<S> {
    verifier: TokenVerifier,
    users: JwtUsers<S>,
    realm: String,
}

impl<S: UserStore> Authenticator<S> {
    pub fn new(verifier: TokenVerifier, store: S, config: &Config) -> Self {
        Self {
            verifier,
            users: JwtUsers::new(store, config.missing_user_action),
            realm: config.realm.clone(),
        }
    }

    pub fn users(&self) -> &JwtUsers<S> {
        &self.users
    }

    /// Authenticates a raw bearer token.
    ///
    /// Returns `Ok(None)` when no token is given, or when the token is valid but
    /// maps to no user or to an inactive one. Verification failures are errors.
    #[instrument(skip(self, bearer_token), err)]
    pub async fn authenticate(&self, bearer_token: Option<&str>) -> Result<Option<S::User>, AadJwtError> {
        let token = match bearer_token {
            Some(token) if !token.is_empty() => token,
            _ => return Ok(None),
        };
        let claims = self.verifier.verify(token).await?;
        self.authenticate_claims(&claims).await
    }

    /// Authenticates the value of an `Authorization` header.
    pub async fn authenticate_header(&self, authorization: &str) -> Result<Option<S::User>, AadJwtError> {
        self.authenticate(bearer_token_from_header(authorization)).await
    }

    /// Maps already verified claims to an active user.
    pub async fn authenticate_claims(&self, claims: &Claims) -> Result<Option<S::User>, AadJwtError> {
        let user_claims = UserClaims::from_claims(claims)?;
        let user = self.users.get_for_claims(&user_claims).await?;
        Ok(user.filter(|user| {
            let active = user.is_active();
            if !active {
                debug!("User {} is inactive", user.username());
            }
            active
        }))
    }

    /// The `WWW-Authenticate` challenge for rejected requests.
    pub fn www_authenticate(&self) -> String {
        format!("Bearer realm=\"{}\"", self.realm)
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token_from_header(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.trim().split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}
