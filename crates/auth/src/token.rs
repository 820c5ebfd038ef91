//! Bearer token verification.
//!
//! Only RSA signatures (RS256/RS384/RS512) are accepted. The header algorithm is
//! checked before any key material is used, so a token signed with a symmetric
//! algorithm is rejected even if its signature would verify under the public key
//! bytes treated as an HMAC secret.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use thiserror::Error;

use warden_core::SecurityError;

use crate::claims::{Claims, ClaimsPolicy, FieldError};

const RSA_ALGORITHMS: [Algorithm; 3] = [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("signature is invalid")]
    SignatureInvalid,

    #[error("unexpected signing method: {0}")]
    UnexpectedSigningMethod(String),

    #[error("invalid verification key: {0}")]
    InvalidKey(String),

    #[error("invalid claims: {}", join_field_errors(.0))]
    InvalidClaims(Vec<FieldError>),
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<TokenError> for SecurityError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::SignatureInvalid => SecurityError::SignatureInvalid,
            TokenError::UnexpectedSigningMethod(alg) => SecurityError::UnexpectedSigningMethod(alg),
            other => SecurityError::MalformedToken(other.to_string()),
        }
    }
}

/// Turns a raw bearer token into validated claims.
pub trait TokenVerifier: Send + Sync {
    /// Decode and cryptographically verify `raw` (no claims validation).
    fn parse(&self, raw: &str) -> Result<Claims, TokenError>;

    /// Claims acceptance rules applied by [`TokenVerifier::authenticate`].
    fn policy(&self) -> &ClaimsPolicy;

    /// Verify the signature, then validate the claims at `now`.
    fn authenticate(&self, raw: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let claims = self.parse(raw)?;
        let errors = claims.validate(now, self.policy());
        if !errors.is_empty() {
            return Err(TokenError::InvalidClaims(errors));
        }
        Ok(claims)
    }
}

/// RSA public-key verifier.
#[derive(Clone)]
pub struct RsaTokenVerifier {
    key: DecodingKey,
    policy: ClaimsPolicy,
}

impl core::fmt::Debug for RsaTokenVerifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RsaTokenVerifier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RsaTokenVerifier {
    pub fn new(key: DecodingKey, policy: ClaimsPolicy) -> Self {
        Self { key, policy }
    }

    /// Build from an already-loaded PEM public key (PKCS#1 or SPKI).
    pub fn from_rsa_pem(pem: &[u8], policy: ClaimsPolicy) -> Result<Self, TokenError> {
        let key = DecodingKey::from_rsa_pem(pem).map_err(|e| TokenError::InvalidKey(e.to_string()))?;
        Ok(Self::new(key, policy))
    }
}

impl TokenVerifier for RsaTokenVerifier {
    fn parse(&self, raw: &str) -> Result<Claims, TokenError> {
        let header = decode_header(raw).map_err(|e| TokenError::Malformed(e.to_string()))?;
        if !RSA_ALGORITHMS.contains(&header.alg) {
            return Err(TokenError::UnexpectedSigningMethod(format!("{:?}", header.alg)));
        }

        // Time, issuer and audience checks belong to `Claims::validate`.
        let mut validation = Validation::new(header.alg);
        validation.algorithms = RSA_ALGORITHMS.to_vec();
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        // Structure first: an undecodable claims segment is malformed no matter
        // what the signature says.
        let mut structural = validation.clone();
        structural.insecure_disable_signature_validation();
        decode::<Claims>(raw, &self.key, &structural)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        decode::<Claims>(raw, &self.key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
                ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                    TokenError::UnexpectedSigningMethod(format!("{:?}", header.alg))
                }
                ErrorKind::InvalidRsaKey(_) => TokenError::InvalidKey(e.to_string()),
                _ => TokenError::Malformed(e.to_string()),
            })
    }

    fn policy(&self) -> &ClaimsPolicy {
        &self.policy
    }
}
