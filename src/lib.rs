//! Bouncer - a token-issuing gatekeeper for protected systems
//!
//! Bouncer sits in front of a user/group directory. It exchanges
//! credentials for short-lived signed tokens whose validity is anchored to
//! a server-side secret held in a TTL cache, and it answers "may this
//! caller use this system?" against a wildcard-capable URI access list.
//! Users can also delegate read access to a single system through
//! shareable capability keys.

pub mod access;
pub mod auth;
pub mod capability;
pub mod config;
pub mod crypto;
pub mod directory;
pub mod server;
pub mod storage;
pub mod token;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type for every bouncer operation
///
/// All variants are terminal for the current request. `Directory` and
/// `Internal` carry server-side detail that must not reach the caller;
/// use [`AuthError::public_message`] when rendering a response.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Unsupported authorization method: {0}")]
    UnsupportedScheme(String),

    #[error("Malformed credentials: {0}")]
    MalformedCredentials(String),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("This account has been disabled. Please contact the administrator for more info.")]
    AccountDisabled,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Revalidation code does not match")]
    RevalidationMismatch,

    #[error("You do not have access to this system")]
    Forbidden,

    #[error("Capability list not found or expired")]
    CapabilityNotFound,

    #[error("Capability key is not valid")]
    InvalidCapabilityKey,

    #[error("Directory error: {0}")]
    Directory(#[from] directory::DirectoryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Machine-readable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::MissingCredentials => ErrorKind::MissingCredentials,
            AuthError::UnsupportedScheme(_) => ErrorKind::UnsupportedScheme,
            AuthError::MalformedCredentials(_) => ErrorKind::MalformedCredentials,
            AuthError::InvalidPassword => ErrorKind::InvalidPassword,
            AuthError::AccountDisabled => ErrorKind::AccountDisabled,
            AuthError::InvalidToken(_) => ErrorKind::InvalidToken,
            AuthError::RevalidationMismatch => ErrorKind::RevalidationMismatch,
            AuthError::Forbidden => ErrorKind::Forbidden,
            AuthError::CapabilityNotFound => ErrorKind::CapabilityNotFound,
            AuthError::InvalidCapabilityKey => ErrorKind::InvalidCapabilityKey,
            AuthError::Directory(_) => ErrorKind::DirectoryError,
            AuthError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Message safe to hand back to the caller
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Directory(_) => "Error retrieving user info".to_string(),
            AuthError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<storage::StoreError> for AuthError {
    fn from(err: storage::StoreError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<token::TokenError> for AuthError {
    fn from(err: token::TokenError) -> Self {
        match err {
            token::TokenError::Signing(msg) => AuthError::Internal(msg),
            token::TokenError::Store(err) => err.into(),
            token::TokenError::RevalidationMismatch => AuthError::RevalidationMismatch,
            other => AuthError::InvalidToken(other.to_string()),
        }
    }
}

impl From<auth::DeliveryError> for AuthError {
    fn from(err: auth::DeliveryError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<auth::ChallengeError> for AuthError {
    fn from(err: auth::ChallengeError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// Serializable error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    MissingCredentials,
    UnsupportedScheme,
    MalformedCredentials,
    InvalidPassword,
    AccountDisabled,
    InvalidToken,
    RevalidationMismatch,
    Forbidden,
    CapabilityNotFound,
    InvalidCapabilityKey,
    DirectoryError,
    InternalError,
    /// The transport could not decode the request
    InvalidRequest,
}

/// One grant: a protected system and the rights held on it
///
/// Rights are opaque (a string, a list, or a map) and are passed through
/// to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEntry {
    /// System URI, optionally ending in a `*` path segment
    pub uri: String,
    /// Rights granted on the system
    pub rights: serde_json::Value,
}

impl AccessEntry {
    pub fn new(uri: impl Into<String>, rights: impl Into<serde_json::Value>) -> Self {
        Self {
            uri: uri.into(),
            rights: rights.into(),
        }
    }
}

/// A password or similar credential that must not show up in logs
#[derive(Debug, Clone)]
pub struct Secret(SecretString);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Expose the secret value
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Result of one operation, as handed to the transport layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// A freshly issued token
    Token {
        token: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        revalidation_code: Option<String>,
    },
    /// Rights granted on the requested system
    Rights { rights: serde_json::Value },
    /// Any other successful result carrying data
    Data { data: serde_json::Value },
    /// A failed operation
    Error { kind: ErrorKind, message: String },
}

impl From<AuthError> for Outcome {
    fn from(err: AuthError) -> Self {
        match &err {
            AuthError::Directory(_) | AuthError::Internal(_) => {
                tracing::error!(error = %err, "Request failed");
            }
            _ => tracing::debug!(error = %err, "Request denied"),
        }
        Outcome::Error {
            kind: err.kind(),
            message: err.public_message(),
        }
    }
}
