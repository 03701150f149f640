//! Signed session tokens
//!
//! A token is self-contained, but it is only honoured while the secret it
//! was signed with is still cached for its subject. Each login derives a
//! new secret, so it invalidates every token issued before it; deleting the
//! secret logs the user out everywhere.
//!
//! Two clocks bound a session:
//! - the cached secret expires after `expiration` of inactivity and is
//!   touched on every successful check (sliding window)
//! - the embedded `exp` claim is an absolute ceiling of `max_session`
//!   after the password login (`auth_time`); refreshed tokens inherit it

mod jws;

pub use jws::{decode, encode, Decoded, SigningAlgorithm};

use crate::config::TokenConfig;
use crate::crypto::{constant_time_eq, derive_secret};
use crate::storage::{keys, SecretStore, StoreError};
use crate::AccessEntry;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Token-related errors
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("session expired or unknown")]
    UnknownSession,

    #[error("signature verification failed")]
    BadSignature,

    #[error("unsigned tokens are not accepted")]
    UnsignedRejected,

    #[error("token expired")]
    Expired,

    #[error("revalidation code does not match")]
    RevalidationMismatch,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Claims carried by every token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Username the token was issued to
    pub sub: String,
    /// Link to the user's description, when the directory has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Access list snapshot taken at issuance
    #[serde(default)]
    pub systems: Vec<AccessEntry>,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Time of the password login this session started with (unix seconds)
    pub auth_time: i64,
    /// Absolute expiry (unix seconds)
    pub exp: i64,
}

impl TokenClaims {
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }
}

/// The cached half of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSecret {
    pub secret: String,
    pub issued_at: i64,
}

/// Result of a successful issuance
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Secondary code accepted by [`TokenEngine::revalidate`]
    pub revalidation_code: String,
    /// Absolute expiry of the token
    pub expires_at: DateTime<Utc>,
    pub claims: TokenClaims,
}

/// Issues and validates tokens against secrets held in a [`SecretStore`]
pub struct TokenEngine {
    store: Arc<dyn SecretStore>,
    config: TokenConfig,
}

impl TokenEngine {
    pub fn new(store: Arc<dyn SecretStore>, mut config: TokenConfig) -> Self {
        if config.algorithm == SigningAlgorithm::None && !config.allow_unsigned {
            warn!("Unsigned tokens requested without allow_unsigned; signing with HS256");
            config.algorithm = SigningAlgorithm::Hs256;
        }
        if config.algorithm == SigningAlgorithm::None {
            warn!("Issuing unsigned tokens: anyone can forge a token for any user");
        }
        Self { store, config }
    }

    /// Algorithm new tokens are signed with
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.config.algorithm
    }

    /// Issue a token for `subject` after a fresh login.
    ///
    /// `stable` seeds the new secret (the user's password hash). The token
    /// is only returned once the secret and revalidation code are cached.
    pub async fn issue(
        &self,
        subject: &str,
        uri: Option<String>,
        systems: Vec<AccessEntry>,
        stable: &str,
    ) -> Result<IssuedToken, TokenError> {
        let now = Utc::now().timestamp();
        self.sign(subject, uri, systems, stable, now).await
    }

    /// Replace a validated token with a new one for the same session.
    ///
    /// The new token keeps `previous.auth_time`, so its `exp` never moves
    /// past the ceiling set at login.
    pub async fn refresh(
        &self,
        previous: &TokenClaims,
        uri: Option<String>,
        systems: Vec<AccessEntry>,
        stable: &str,
    ) -> Result<IssuedToken, TokenError> {
        if self.ceiling(previous.auth_time) <= Utc::now().timestamp() {
            debug!(user = %previous.sub, "Session reached its ceiling");
            return Err(TokenError::Expired);
        }
        self.sign(&previous.sub, uri, systems, stable, previous.auth_time)
            .await
    }

    fn ceiling(&self, auth_time: i64) -> i64 {
        let max_session = i64::try_from(self.config.max_session.as_secs()).unwrap_or(i64::MAX);
        auth_time.saturating_add(max_session)
    }

    async fn sign(
        &self,
        subject: &str,
        uri: Option<String>,
        systems: Vec<AccessEntry>,
        stable: &str,
        auth_time: i64,
    ) -> Result<IssuedToken, TokenError> {
        let now = Utc::now().timestamp();
        let session = SessionSecret {
            secret: derive_secret(stable),
            issued_at: now,
        };
        let claims = TokenClaims {
            sub: subject.to_string(),
            uri,
            systems,
            iat: now,
            auth_time,
            exp: self.ceiling(auth_time),
        };

        let token = encode(self.config.algorithm, &claims, session.secret.as_bytes())?;
        let revalidation_code = derive_secret(&session.secret);

        let blob = serde_json::to_string(&session).map_err(StoreError::from)?;
        self.store
            .put(&keys::secret(subject), &blob, self.config.expiration)
            .await?;
        self.store
            .put(
                &keys::revalidation(subject),
                &revalidation_code,
                self.config.revalidation,
            )
            .await?;

        Ok(IssuedToken {
            token,
            revalidation_code,
            expires_at: claims.expires_at(),
            claims,
        })
    }

    /// Decode a token and verify it against its subject's cached secret
    pub async fn validate(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.verify(token).await?;
        if claims.is_expired() {
            debug!(user = %claims.sub, "Token past its expiry");
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Slide the subject's session window; `false` when the secret is gone
    pub async fn touch(&self, subject: &str) -> Result<bool, TokenError> {
        let touched = self
            .store
            .touch(&keys::secret(subject), self.config.expiration)
            .await?;
        Ok(touched)
    }

    /// Re-confirm a session with its revalidation code.
    ///
    /// The signature must still match the cached secret but the embedded
    /// expiry is not checked.
    pub async fn revalidate(&self, token: &str, code: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.verify(token).await?;
        let cached = self
            .store
            .get(&keys::revalidation(&claims.sub))
            .await?
            .ok_or(TokenError::RevalidationMismatch)?;

        if !constant_time_eq(&cached, code) {
            return Err(TokenError::RevalidationMismatch);
        }
        Ok(claims)
    }

    /// Drop the subject's secret and revalidation code
    pub async fn revoke(&self, subject: &str) -> Result<(), TokenError> {
        self.store.delete(&keys::secret(subject)).await?;
        self.store.delete(&keys::revalidation(subject)).await?;
        Ok(())
    }

    async fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let decoded: Decoded<TokenClaims> = decode(token)?;
        if decoded.algorithm == SigningAlgorithm::None && !self.config.allow_unsigned {
            return Err(TokenError::UnsignedRejected);
        }

        let blob = self
            .store
            .get(&keys::secret(&decoded.claims.sub))
            .await?
            .ok_or(TokenError::UnknownSession)?;
        let session: SessionSecret = serde_json::from_str(&blob).map_err(StoreError::from)?;

        decoded.verify(session.secret.as_bytes())?;
        Ok(decoded.claims)
    }
}
