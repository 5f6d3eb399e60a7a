//! JWT encoding, signing and verification.
//!
//! Credentials are RS256-signed JWTs. The private half of the
//! [`SigningKeyPair`] signs; the public half verifies and is published as a
//! JSON Web Key Set so third parties can verify access credentials on their
//! own.
//!
//! ## Example
//!
//! ```ignore
//! use tessera_auth::token::jwt::{JwtService, SigningKeyPair};
//!
//! let key_pair = SigningKeyPair::generate_rsa("key-1")?;
//! let jwt_service = JwtService::new(key_pair, "https://auth.example.com");
//!
//! let token = jwt_service.encode(&claims)?;
//! let data = jwt_service.decode::<TokenClaims>(&token)?;
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::SigningConfig;
use crate::error::AuthError;

/// The only signing algorithm in use.
pub const ALGORITHM: Algorithm = Algorithm::RS256;

const RSA_KEY_BITS: usize = 2048;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token cannot be parsed.
    #[error("Malformed token: {message}")]
    Malformed {
        /// Description of the parse failure.
        message: String,
    },

    /// The token parses but its structure, algorithm or claims are not accepted.
    #[error("Unsupported token: {message}")]
    Unsupported {
        /// Description of what is not accepted.
        message: String,
    },

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },

    /// Failed to generate a key pair.
    #[error("Key generation error: {message}")]
    KeyGeneration {
        /// Description of the key generation error.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a new `Unsupported` error.
    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates a new `KeyGeneration` error.
    #[must_use]
    pub fn key_generation(message: impl Into<String>) -> Self {
        Self::KeyGeneration {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
                Self::malformed(err.to_string())
            }
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::Json(_) => Self::unsupported(err.to_string()),
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
                Self::invalid_key(err.to_string())
            }
            _ => Self::malformed(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::Malformed { message } => AuthError::MalformedToken { message },
            JwtError::Unsupported { message } => AuthError::UnsupportedToken { message },
            JwtError::InvalidSignature => AuthError::InvalidSignature,
            JwtError::Encoding { message } => AuthError::Internal { message },
            JwtError::InvalidKey { message } | JwtError::KeyGeneration { message } => {
                AuthError::Configuration { message }
            }
        }
    }
}

// ============================================================================
// Token Claims
// ============================================================================

/// Kind of credential, carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    /// Short-lived credential authorizing requests.
    Access,
    /// Long-lived credential exchanged for new access credentials.
    Refresh,
}

impl TokenType {
    /// Returns the claim value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "ACCESS",
            Self::Refresh => "REFRESH",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Claims shared by access and refresh credentials.
///
/// `username` and `authorities` are only present on access credentials and
/// are a snapshot taken at issuance. They are informational; authorization
/// always reloads the live role set from storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// Issuer.
    pub iss: String,

    /// Subject (user ID).
    pub sub: String,

    /// Credential kind.
    #[serde(rename = "type")]
    pub token_type: TokenType,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Unique token ID; makes every issued credential distinct.
    pub jti: String,

    /// Username at issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Role and permission names at issuance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorities: Vec<String>,
}

impl TokenClaims {
    /// Creates claims for an access credential.
    #[must_use]
    pub fn access(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        lifetime_secs: i64,
        username: impl Into<String>,
        authorities: Vec<String>,
    ) -> Self {
        let mut claims = Self::new(issuer, subject, TokenType::Access, lifetime_secs);
        claims.username = Some(username.into());
        claims.authorities = authorities;
        claims
    }

    /// Creates claims for a refresh credential.
    #[must_use]
    pub fn refresh(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        lifetime_secs: i64,
    ) -> Self {
        Self::new(issuer, subject, TokenType::Refresh, lifetime_secs)
    }

    fn new(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        token_type: TokenType,
        lifetime_secs: i64,
    ) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            iss: issuer.into(),
            sub: subject.into(),
            token_type,
            iat: now,
            exp: now.saturating_add(lifetime_secs),
            jti: uuid::Uuid::new_v4().to_string(),
            username: None,
            authorities: Vec::new(),
        }
    }

    /// Returns the expiration as a timestamp.
    ///
    /// # Errors
    /// Returns `JwtError::Encoding` if `exp` is outside the representable
    /// date range.
    pub fn expires_at(&self) -> Result<OffsetDateTime, JwtError> {
        OffsetDateTime::from_unix_timestamp(self.exp)
            .map_err(|e| JwtError::encoding(format!("exp {} out of range: {e}", self.exp)))
    }
}

// ============================================================================
// JWKS Types
// ============================================================================

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

/// JSON Web Key (RSA).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, always "RSA".
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use ("sig" for signing).
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm, always "RS256".
    pub alg: String,

    /// RSA modulus (base64url encoded).
    pub n: String,

    /// RSA exponent (base64url encoded).
    pub e: String,
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// An RSA signing key pair.
pub struct SigningKeyPair {
    /// Key ID.
    pub kid: String,

    encoding_key: EncodingKey,

    decoding_key: DecodingKey,

    /// Big-endian modulus.
    n: Vec<u8>,

    /// Big-endian public exponent.
    e: Vec<u8>,

    /// When the key was created or loaded.
    pub created_at: OffsetDateTime,
}

impl SigningKeyPair {
    /// Generates a new 2048-bit RSA key pair.
    ///
    /// # Errors
    /// Returns an error if key generation or PEM export fails.
    pub fn generate_rsa(kid: impl Into<String>) -> Result<Self, JwtError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map_err(|e| JwtError::key_generation(e.to_string()))?;
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation(e.to_string()))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation(e.to_string()))?;

        Self::from_pem(kid, private_pem.as_str(), &public_pem)
    }

    /// Loads a key pair from PEM strings.
    ///
    /// # Arguments
    /// * `kid` - Key ID
    /// * `private_pem` - PKCS#8 PEM-encoded private key
    /// * `public_pem` - SPKI PEM-encoded public key
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid.
    pub fn from_pem(
        kid: impl Into<String>,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, JwtError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        let public_key = RsaPublicKey::from_public_key_pem(public_pem)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid: kid.into(),
            encoding_key,
            decoding_key,
            n: public_key.n().to_bytes_be(),
            e: public_key.e().to_bytes_be(),
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Loads the key pair named by the signing configuration, or generates
    /// an ephemeral one when no key files are configured.
    ///
    /// # Errors
    /// Returns an error if a key file cannot be read or parsed, or if only
    /// one of the two paths is set.
    pub fn from_config(config: &SigningConfig) -> Result<Self, JwtError> {
        match (&config.private_key_path, &config.public_key_path) {
            (Some(private_path), Some(public_path)) => {
                let private_pem = std::fs::read_to_string(private_path).map_err(|e| {
                    JwtError::invalid_key(format!("{}: {}", private_path.display(), e))
                })?;
                let public_pem = std::fs::read_to_string(public_path).map_err(|e| {
                    JwtError::invalid_key(format!("{}: {}", public_path.display(), e))
                })?;
                Self::from_pem(config.key_id.clone(), &private_pem, &public_pem)
            }
            (None, None) => {
                tracing::warn!(
                    kid = %config.key_id,
                    "No signing key configured; generating an ephemeral RSA key pair"
                );
                Self::generate_rsa(config.key_id.clone())
            }
            _ => Err(JwtError::invalid_key(
                "Both private_key_path and public_key_path must be set",
            )),
        }
    }

    /// Exports the public key as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: self.kid.clone(),
            use_: "sig".to_string(),
            alg: "RS256".to_string(),
            n: URL_SAFE_NO_PAD.encode(&self.n),
            e: URL_SAFE_NO_PAD.encode(&self.e),
        }
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// JWT Service
// ============================================================================

/// Service for encoding and decoding JWT tokens.
///
/// This service is thread-safe (`Send + Sync`) and can be shared across
/// async tasks.
#[derive(Debug)]
pub struct JwtService {
    signing_key: SigningKeyPair,
    issuer: String,
}

impl JwtService {
    /// Creates a new JWT service.
    #[must_use]
    pub fn new(signing_key: SigningKeyPair, issuer: impl Into<String>) -> Self {
        Self {
            signing_key,
            issuer: issuer.into(),
        }
    }

    /// Encodes claims into a signed JWT string.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let mut header = Header::new(ALGORITHM);
        header.kid = Some(self.signing_key.kid.clone());

        encode(&header, claims, &self.signing_key.encoding_key)
            .map_err(|e| JwtError::encoding(e.to_string()))
    }

    /// Decodes a JWT string, verifying signature, issuer and expiry.
    ///
    /// # Errors
    /// Returns a classified [`JwtError`] if any check fails.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<TokenData<T>, JwtError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.validate_exp = true;
        validation.validate_aud = false;
        // Issuer and verifier share a clock.
        validation.leeway = 0;

        decode(token, &self.signing_key.decoding_key, &validation).map_err(JwtError::from)
    }

    /// Returns the current signing key ID.
    #[must_use]
    pub fn current_kid(&self) -> &str {
        &self.signing_key.kid
    }

    /// Returns the issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the JWKS containing the public key.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: vec![self.signing_key.to_jwk()],
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
