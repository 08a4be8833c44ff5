//! JWT bearer token verification backed by `jsonwebtoken`.

use std::str::FromStr;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::domain::{ApiError, Claims, ConfigError, TokenVerifier};

/// Verifies signed JWTs and extracts [`Claims`].
///
/// `exp` is checked when present but not required, matching tokens issued
/// without an expiry.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// HS256 verification with a shared secret.
    #[must_use]
    pub fn from_secret(secret: &SecretString) -> Self {
        let decoding_key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
        Self::new(decoding_key, Algorithm::HS256)
    }

    /// Asymmetric verification with a PEM encoded public key.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if the algorithm name is unknown,
    /// not asymmetric, or the key does not parse.
    pub fn from_public_key_pem(pem: &str, algorithm: &str) -> Result<Self, ConfigError> {
        let algorithm = Algorithm::from_str(algorithm).map_err(|e| ConfigError::InvalidValue {
            key: "RESTWIRE_JWT_ALGORITHM".to_string(),
            message: e.to_string(),
        })?;

        let key = match algorithm {
            Algorithm::EdDSA => DecodingKey::from_ed_pem(pem.as_bytes()),
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem.as_bytes()),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem.as_bytes()),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                return Err(ConfigError::InvalidValue {
                    key: "RESTWIRE_JWT_ALGORITHM".to_string(),
                    message: "HMAC algorithms take RESTWIRE_JWT_SECRET, not a public key"
                        .to_string(),
                });
            }
        }
        .map_err(|e| ConfigError::InvalidValue {
            key: "RESTWIRE_JWT_PUBLIC_KEY".to_string(),
            message: e.to_string(),
        })?;

        Ok(Self::new(key, algorithm))
    }

    fn new(decoding_key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims.clear();
        validation.validate_aud = false;
        validation.leeway = 0;

        Self {
            decoding_key,
            validation,
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "JWT verification failed");
                ApiError::unauthenticated()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn sign(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(exp: Option<u64>) -> Claims {
        Claims {
            sub: "john".to_string(),
            sid: "123".to_string(),
            adm: true,
            exp,
            iat: Some(now()),
        }
    }

    #[tokio::test]
    async fn test_verify_valid_token() {
        let verifier = JwtVerifier::from_secret(&SecretString::from("s3cret".to_string()));
        let token = sign(&claims(Some(now() + 300)), "s3cret");

        let verified = verifier.verify(&token).await.unwrap();
        assert_eq!(verified.sub, "john");
        assert_eq!(verified.sid, "123");
        assert!(verified.adm);
    }

    #[tokio::test]
    async fn test_verify_token_without_expiry() {
        let verifier = JwtVerifier::from_secret(&SecretString::from("s3cret".to_string()));
        let token = sign(&claims(None), "s3cret");

        assert!(verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_rejects_wrong_secret() {
        let verifier = JwtVerifier::from_secret(&SecretString::from("s3cret".to_string()));
        let token = sign(&claims(Some(now() + 300)), "other");

        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            ApiError::unauthenticated()
        );
    }

    #[tokio::test]
    async fn test_verify_rejects_expired_token() {
        let verifier = JwtVerifier::from_secret(&SecretString::from("s3cret".to_string()));
        let token = sign(&claims(Some(now() - 60)), "s3cret");

        assert!(verifier.verify(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_verify_rejects_garbage() {
        let verifier = JwtVerifier::from_secret(&SecretString::from("s3cret".to_string()));
        assert!(verifier.verify("not-a-jwt").await.is_err());
    }

    #[test]
    fn test_public_key_rejects_hmac_algorithm() {
        let result = JwtVerifier::from_public_key_pem("irrelevant", "HS256");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_public_key_rejects_unknown_algorithm() {
        let result = JwtVerifier::from_public_key_pem("irrelevant", "XYZ");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_public_key_rejects_malformed_pem() {
        let result = JwtVerifier::from_public_key_pem("not a pem", "EdDSA");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
