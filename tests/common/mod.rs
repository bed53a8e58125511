#![allow(dead_code)]

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TENANT_ID: &str = "some-tenant-id";
pub const KID: &str = "test-kid";
pub const AUDIENCE: &str = "api://aad-jwt-tests";
pub const METADATA_PATH: &str = "/some-tenant-id/v2.0/.well-known/openid-configuration";
pub const KEYS_PATH: &str = "/some-tenant-id/discovery/v2.0/keys";

const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");

pub fn private_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(SIGNING_KEY_PEM).unwrap()
}

pub fn encoding_key() -> EncodingKey {
    let pkcs1_der = private_key().to_pkcs1_der().unwrap();
    EncodingKey::from_rsa_der(pkcs1_der.as_bytes())
}

/// The fixture key as a JWK, as Azure AD publishes it.
pub fn public_jwk(kid: &str) -> Value {
    let public_key = private_key().to_public_key();
    json!({
        "kty": "RSA",
        "use": "sig",
        "kid": kid,
        "x5t": kid,
        "n": base64_url::encode(&public_key.n().to_bytes_be()),
        "e": base64_url::encode(&public_key.e().to_bytes_be()),
    })
}

pub fn issuer(server: &MockServer) -> String {
    format!("{}/{}/v2.0", server.uri(), TENANT_ID)
}

pub fn now() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

/// Claims resembling an Azure AD v2 access token, valid for an hour.
pub fn valid_claims(server: &MockServer) -> Value {
    let now = now();
    json!({
        "aud": AUDIENCE,
        "iss": issuer(server),
        "iat": now,
        "nbf": now,
        "exp": now + 3600,
        "sub": "subject-id",
        "oid": "object-id",
        "tid": TENANT_ID,
        "preferred_username": "alice@contoso.com",
        "name": "Alice",
    })
}

pub fn sign(claims: &Value, alg: Algorithm, kid: &str) -> String {
    let mut header = Header::new(alg);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &encoding_key()).unwrap()
}

/// Mounts discovery and JWKS endpoints that behave like Azure AD for `TENANT_ID`.
pub async fn mock_azure_ad() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(METADATA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer(&server),
            "jwks_uri": format!("{}{}", server.uri(), KEYS_PATH),
            "token_endpoint": format!("{}/{}/oauth2/v2.0/token", server.uri(), TENANT_ID),
            "id_token_signing_alg_values_supported": ["RS256"],
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(KEYS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [public_jwk(KID)] })))
        .mount(&server)
        .await;
    server
}
