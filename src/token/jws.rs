//! Compact JWS tokens
//!
//! HMAC tokens are encoded and verified by `jsonwebtoken`. The `none`
//! algorithm, which `jsonwebtoken` refuses to handle, is written here as
//! `base64url(header).base64url(claims).` with an empty signature segment.
//!
//! Verification needs the subject's secret, and the subject is inside the
//! token, so [`decode`] reads the claims without checking them first and
//! [`Decoded::verify`] checks the signature once the key is known.

use super::TokenError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Token signing algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// Unsigned. Anyone can forge these; only for interoperability testing.
    None,
    Hs256,
    Hs384,
    Hs512,
}

impl SigningAlgorithm {
    /// Lenient lookup: unrecognized names fall back to HS256
    pub fn resolve(name: &str) -> Self {
        name.parse().unwrap_or(SigningAlgorithm::Hs256)
    }

    /// JWS `alg` header value
    pub fn name(&self) -> &'static str {
        match self {
            SigningAlgorithm::None => "none",
            SigningAlgorithm::Hs256 => "HS256",
            SigningAlgorithm::Hs384 => "HS384",
            SigningAlgorithm::Hs512 => "HS512",
        }
    }

    fn jwt(&self) -> Option<Algorithm> {
        match self {
            SigningAlgorithm::None => None,
            SigningAlgorithm::Hs256 => Some(Algorithm::HS256),
            SigningAlgorithm::Hs384 => Some(Algorithm::HS384),
            SigningAlgorithm::Hs512 => Some(Algorithm::HS512),
        }
    }
}

impl FromStr for SigningAlgorithm {
    type Err = TokenError;

    /// Strict parse of a JWS `alg` value
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SigningAlgorithm::None),
            "HS256" => Ok(SigningAlgorithm::Hs256),
            "HS384" => Ok(SigningAlgorithm::Hs384),
            "HS512" => Ok(SigningAlgorithm::Hs512),
            other => Err(TokenError::Malformed(format!(
                "unsupported algorithm '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Header fields read before verification
#[derive(Debug, Serialize, Deserialize)]
struct UnverifiedHeader {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Serialize and sign `claims`
pub fn encode<T: Serialize>(
    algorithm: SigningAlgorithm,
    claims: &T,
    key: &[u8],
) -> Result<String, TokenError> {
    let Some(alg) = algorithm.jwt() else {
        return encode_unsigned(claims);
    };
    jsonwebtoken::encode(&Header::new(alg), claims, &EncodingKey::from_secret(key))
        .map_err(|e| TokenError::Signing(e.to_string()))
}

fn encode_unsigned<T: Serialize>(claims: &T) -> Result<String, TokenError> {
    let header = UnverifiedHeader {
        alg: SigningAlgorithm::None.name().to_string(),
        typ: Some("JWT".to_string()),
    };
    let header = serde_json::to_vec(&header).map_err(|e| TokenError::Signing(e.to_string()))?;
    let claims = serde_json::to_vec(claims).map_err(|e| TokenError::Signing(e.to_string()))?;
    Ok(format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(claims)
    ))
}

/// A structurally valid token whose signature has not been checked yet
#[derive(Debug)]
pub struct Decoded<T> {
    pub algorithm: SigningAlgorithm,
    pub claims: T,
    token: String,
}

impl<T> Decoded<T> {
    /// Check the signature against `key`.
    ///
    /// Only the signature is checked; expiry is left to the caller.
    pub fn verify(&self, key: &[u8]) -> Result<(), TokenError> {
        let Some(alg) = self.algorithm.jwt() else {
            return if self.token.ends_with('.') {
                Ok(())
            } else {
                Err(TokenError::BadSignature)
            };
        };

        let mut validation = Validation::new(alg);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let key = DecodingKey::from_secret(key);
        jsonwebtoken::decode::<IgnoredAny>(&self.token, &key, &validation)
            .map(|_| ())
            .map_err(|e| match e.kind() {
                JwtErrorKind::InvalidSignature | JwtErrorKind::InvalidAlgorithm => {
                    TokenError::BadSignature
                }
                _ => TokenError::Malformed(e.to_string()),
            })
    }
}

/// Split and decode a compact token without verifying it
pub fn decode<T: DeserializeOwned>(token: &str) -> Result<Decoded<T>, TokenError> {
    let segments = || TokenError::Malformed("expected three segments".to_string());
    let (signing_input, signature) = token.rsplit_once('.').ok_or_else(segments)?;
    let (header, claims) = signing_input.split_once('.').ok_or_else(segments)?;
    if claims.contains('.') {
        return Err(segments());
    }

    let header: UnverifiedHeader = decode_segment(header, "header")?;
    let algorithm: SigningAlgorithm = header.alg.parse()?;
    let claims: T = decode_segment(claims, "claims")?;
    URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|e| TokenError::Malformed(format!("signature: {}", e)))?;

    Ok(Decoded {
        algorithm,
        claims,
        token: token.to_string(),
    })
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(format!("{}: {}", what, e)))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(format!("{}: {}", what, e)))
}
