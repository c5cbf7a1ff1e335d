//! Device credential minting for the Cloud IoT MQTT bridge
//!
//! The bridge authenticates devices with a short-lived JWT passed in the MQTT
//! password field. The token audience is the cloud project id; the device is
//! disconnected once the token expires and must reconnect with a fresh one.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default token validity window: 20 minutes.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 20 * 60;

/// Claims embedded in the device authentication token.
///
/// `aud` must always be the cloud project id; the bridge rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Issued-at, seconds since epoch
    pub iat: u64,
    /// Expiry, seconds since epoch
    pub exp: u64,
    /// Audience: the cloud project id
    pub aud: String,
}

impl IdentityClaims {
    /// Build claims valid for `ttl_secs` starting now.
    pub fn new(project_id: &str, ttl_secs: u64) -> Self {
        let iat = chrono::Utc::now().timestamp() as u64;
        Self {
            iat,
            exp: iat + ttl_secs,
            aud: project_id.to_string(),
        }
    }
}

/// Credential stage errors. Both are fatal: the agent cannot connect without
/// a signed token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to read private key {path}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to sign identity token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Signs identity tokens with a PEM private key loaded once at construction.
pub struct TokenSigner {
    key: EncodingKey,
    algorithm: Algorithm,
}

impl TokenSigner {
    /// Load a PEM-encoded private key and prepare it for `algorithm`.
    ///
    /// Only asymmetric algorithms the bridge accepts are supported: RS256
    /// (RSA PKCS#1) and ES256 (EC P-256).
    pub fn from_pem_file(path: &Path, algorithm: &str) -> Result<Self, AuthError> {
        let pem = std::fs::read(path).map_err(|source| AuthError::KeyRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_pem(&pem, algorithm)
    }

    /// Build a signer from in-memory PEM bytes. Used by tests and callers that
    /// source keys from somewhere other than the filesystem.
    pub fn from_pem(pem: &[u8], algorithm: &str) -> Result<Self, AuthError> {
        let (algorithm, key) = match algorithm {
            "RS256" => (
                Algorithm::RS256,
                EncodingKey::from_rsa_pem(pem).map_err(AuthError::Signing)?,
            ),
            "ES256" => (
                Algorithm::ES256,
                EncodingKey::from_ec_pem(pem).map_err(AuthError::Signing)?,
            ),
            other => return Err(AuthError::UnsupportedAlgorithm(other.to_string())),
        };
        Ok(Self { key, algorithm })
    }

    /// Sign the given claims into a compact JWT.
    pub fn sign(&self, claims: &IdentityClaims) -> Result<String, AuthError> {
        encode(&Header::new(self.algorithm), claims, &self.key).map_err(AuthError::Signing)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2048-bit RSA key generated for tests only.
    const TEST_RSA_KEY: &str = include_str!("../tests/fixtures/test_rsa_private.pem");

    #[test]
    fn test_claims_expiry_window() {
        let claims = IdentityClaims::new("my-project", DEFAULT_TOKEN_TTL_SECS);
        assert_eq!(claims.exp, claims.iat + 1200);
        assert_eq!(claims.aud, "my-project");
    }

    #[test]
    fn test_claims_custom_ttl() {
        let claims = IdentityClaims::new("my-project", 60);
        assert_eq!(claims.exp, claims.iat + 60);
    }

    #[test]
    fn test_sign_produces_compact_jwt() {
        let signer = TokenSigner::from_pem(TEST_RSA_KEY.as_bytes(), "RS256").unwrap();
        let claims = IdentityClaims::new("my-project", DEFAULT_TOKEN_TTL_SECS);
        let token = signer.sign(&claims).unwrap();

        // header.payload.signature
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_signed_claims_round_trip() {
        use jsonwebtoken::{decode, DecodingKey, Validation};

        let signer = TokenSigner::from_pem(TEST_RSA_KEY.as_bytes(), "RS256").unwrap();
        let claims = IdentityClaims::new("my-project", DEFAULT_TOKEN_TTL_SECS);
        let token = signer.sign(&claims).unwrap();

        let public_pem = include_str!("../tests/fixtures/test_rsa_public.pem");
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&["my-project"]);

        let decoded = decode::<IdentityClaims>(
            &token,
            &DecodingKey::from_rsa_pem(public_pem.as_bytes()).unwrap(),
            &validation,
        )
        .expect("token should verify against the matching public key");

        assert_eq!(decoded.claims, claims);
    }

    #[test]
    fn test_unsupported_algorithm() {
        let result = TokenSigner::from_pem(TEST_RSA_KEY.as_bytes(), "HS256");
        assert!(matches!(result, Err(AuthError::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn test_from_pem_file_loads_key() {
        let path = Path::new(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/test_rsa_private.pem"
        ));
        let signer = TokenSigner::from_pem_file(path, "RS256").unwrap();
        let claims = IdentityClaims::new("my-project", 60);
        assert!(signer.sign(&claims).is_ok());
    }

    #[test]
    fn test_key_read_error() {
        let result = TokenSigner::from_pem_file(Path::new("/nonexistent/rsa_private.pem"), "RS256");
        assert!(matches!(result, Err(AuthError::KeyRead { .. })));
    }

    #[test]
    fn test_signing_error_on_garbage_key() {
        let result = TokenSigner::from_pem(b"not a pem key", "RS256");
        assert!(matches!(result, Err(AuthError::Signing(_))));
    }
}
