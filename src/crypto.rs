// src/crypto.rs

//! Conversion of RSA JSON Web Keys into usable public keys.

use crate::error::AadJwtError;
use crate::model::JsonWebKey;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::{DecodePaddingMode, Engine};
use jsonwebtoken::DecodingKey;
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use sha2::{Digest, Sha256};

// Some providers pad their base64url values even though RFC 7518 says not to.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// An RSA public key derived from a JWK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    key: RsaPublicKey,
}

impl PublicKey {
    /// Returns the key as a PEM-encoded SubjectPublicKeyInfo (`-----BEGIN PUBLIC KEY-----`).
    pub fn to_pem(&self) -> Result<String, AadJwtError> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AadJwtError::MalformedKey(format!("failed to encode PEM: {}", e)))
    }

    /// Returns the key as PKCS#1 `RSAPublicKey` DER.
    pub fn to_pkcs1_der(&self) -> Result<Vec<u8>, AadJwtError> {
        self.key
            .to_pkcs1_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| AadJwtError::MalformedKey(format!("failed to encode DER: {}", e)))
    }

    /// Builds the key `jsonwebtoken` verifies signatures with.
    pub fn decoding_key(&self) -> Result<DecodingKey, AadJwtError> {
        Ok(DecodingKey::from_rsa_der(&self.to_pkcs1_der()?))
    }

    /// Computes the RFC 7638 JWK thumbprint (SHA-256, base64url).
    pub fn thumbprint(&self) -> String {
        let e = URL_SAFE_NO_PAD.encode(self.key.e().to_bytes_be());
        let n = URL_SAFE_NO_PAD.encode(self.key.n().to_bytes_be());
        // Members in lexicographic order, no whitespace.
        let canonical = format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, e, n);
        URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
    }

    pub fn as_rsa(&self) -> &RsaPublicKey {
        &self.key
    }
}

/// Converts an RSA JWK into a [`PublicKey`].
///
/// # Errors
///
/// * [`AadJwtError::UnsupportedKeyType`] if `kty` is not `"RSA"`.
/// * [`AadJwtError::MalformedKey`] if `n` or `e` is missing, is not base64url,
///   or does not form a valid RSA public key.
pub fn jwk_to_public_key(jwk: &JsonWebKey) -> Result<PublicKey, AadJwtError> {
    if jwk.kty != "RSA" {
        return Err(AadJwtError::UnsupportedKeyType(jwk.kty.clone()));
    }

    let n = decode_component(jwk.n.as_deref(), "n")?;
    let e = decode_component(jwk.e.as_deref(), "e")?;

    let key = RsaPublicKey::new(n, e)
        .map_err(|e| AadJwtError::MalformedKey(format!("invalid RSA components: {}", e)))?;
    Ok(PublicKey { key })
}

/// Converts an RSA JWK straight into its PEM SubjectPublicKeyInfo encoding.
pub fn jwk_to_rsa_pem(jwk: &JsonWebKey) -> Result<String, AadJwtError> {
    jwk_to_public_key(jwk)?.to_pem()
}

fn decode_component(value: Option<&str>, name: &str) -> Result<BigUint, AadJwtError> {
    let encoded =
        value.ok_or_else(|| AadJwtError::MalformedKey(format!("RSA key missing '{}' component", name)))?;
    let bytes = URL_SAFE_LENIENT
        .decode(encoded)
        .map_err(|e| AadJwtError::MalformedKey(format!("'{}' is not valid base64url: {}", name, e)))?;
    if bytes.is_empty() {
        return Err(AadJwtError::MalformedKey(format!("'{}' is empty", name)));
    }
    Ok(BigUint::from_bytes_be(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::DecodePublicKey;

    const FIXTURE_N: &str = concat!(
        "oaLLT9hkcSj2tGfZsjbu7Xz1Krs0qEicXPmEsJKOBQHauZ_kRM1HdEkgOJ",
        "bUznUspE6xOuOSXjlzErqBxXAu4SCvcvVOCYG2v9G3-uIrLF5dstD0sYHB",
        "o1VomtKxzF90Vslrkn6rNQgUGIWgvuQTxm1uRklYFPEcTIRw0LnYknzJ06G",
        "C9ljKR617wABVrZNkBuDgQKj37qcyxoaxIGdxEcmVFZXJyrxDgdXh9owRmZ",
        "n6LIJlGjZ9m59emfuwnBnsIQG7DirJwe9SXrLXnexRQWqyzCdkYaOqkpKrs",
        "juxUj2-MHX31FqsdpJJsOAvYXGOYBKJRjhGrGdONVrZdUdTBQ",
    );

    const FIXTURE_PEM: &str = concat!(
        "-----BEGIN PUBLIC KEY-----\n",
        "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAoaLLT9hkcSj2tGfZsjbu\n",
        "7Xz1Krs0qEicXPmEsJKOBQHauZ/kRM1HdEkgOJbUznUspE6xOuOSXjlzErqBxXAu\n",
        "4SCvcvVOCYG2v9G3+uIrLF5dstD0sYHBo1VomtKxzF90Vslrkn6rNQgUGIWgvuQT\n",
        "xm1uRklYFPEcTIRw0LnYknzJ06GC9ljKR617wABVrZNkBuDgQKj37qcyxoaxIGdx\n",
        "EcmVFZXJyrxDgdXh9owRmZn6LIJlGjZ9m59emfuwnBnsIQG7DirJwe9SXrLXnexR\n",
        "QWqyzCdkYaOqkpKrsjuxUj2+MHX31FqsdpJJsOAvYXGOYBKJRjhGrGdONVrZdUdT\n",
        "BQIDAQAB\n",
        "-----END PUBLIC KEY-----\n",
    );

    fn rsa_jwk(n: &str, e: &str) -> JsonWebKey {
        JsonWebKey {
            kid: Some("test-kid".to_string()),
            kty: "RSA".to_string(),
            use_purpose: Some("sig".to_string()),
            alg: Some("RS256".to_string()),
            n: Some(n.to_string()),
            e: Some(e.to_string()),
            x5t: None,
            x5c: Vec::new(),
            issuer: None,
        }
    }

    #[test]
    fn converts_jwk_to_rsa_pem() {
        let pem = jwk_to_rsa_pem(&rsa_jwk(FIXTURE_N, "AQAB")).unwrap();
        assert_eq!(pem, FIXTURE_PEM);
    }

    #[test]
    fn pem_round_trips_to_the_same_key() {
        let key = jwk_to_public_key(&rsa_jwk(FIXTURE_N, "AQAB")).unwrap();
        let reparsed = RsaPublicKey::from_public_key_pem(&key.to_pem().unwrap()).unwrap();
        assert_eq!(&reparsed, key.as_rsa());
    }

    #[test]
    fn accepts_padded_components() {
        let key = jwk_to_public_key(&rsa_jwk(FIXTURE_N, "AQAB")).unwrap();
        let padded = jwk_to_public_key(&rsa_jwk(&format!("{}==", FIXTURE_N), "AQAB")).unwrap();
        assert_eq!(key, padded);
    }

    #[test]
    fn rejects_non_rsa_key_types() {
        for kty in ["EC", "oct", "OKP", ""] {
            let mut jwk = rsa_jwk(FIXTURE_N, "AQAB");
            jwk.kty = kty.to_string();
            assert!(
                matches!(jwk_to_public_key(&jwk), Err(AadJwtError::UnsupportedKeyType(ref k)) if k == kty),
                "kty {:?} should be unsupported",
                kty
            );
        }
    }

    #[test]
    fn rejects_undecodable_components() {
        let bad_n = rsa_jwk("not*base64", "AQAB");
        assert!(matches!(jwk_to_public_key(&bad_n), Err(AadJwtError::MalformedKey(_))));

        let mut missing_e = rsa_jwk(FIXTURE_N, "AQAB");
        missing_e.e = None;
        assert!(matches!(jwk_to_public_key(&missing_e), Err(AadJwtError::MalformedKey(_))));

        let empty_n = rsa_jwk("", "AQAB");
        assert!(matches!(jwk_to_public_key(&empty_n), Err(AadJwtError::MalformedKey(_))));
    }

    #[test]
    fn thumbprint_is_stable_and_key_specific() {
        let key = jwk_to_public_key(&rsa_jwk(FIXTURE_N, "AQAB")).unwrap();
        let same = jwk_to_public_key(&rsa_jwk(FIXTURE_N, "AQAB")).unwrap();
        let other = jwk_to_public_key(&rsa_jwk(FIXTURE_N, "Aw")).unwrap();

        assert_eq!(key.thumbprint(), same.thumbprint());
        assert_ne!(key.thumbprint(), other.thumbprint());
        // SHA-256 is 32 bytes -> 43 unpadded base64url characters.
        assert_eq!(key.thumbprint().len(), 43);
    }
}
