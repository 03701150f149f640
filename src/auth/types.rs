//! Credential types

use crate::Secret;
use std::fmt;

/// Authorization scheme presented by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `Basic base64(username:password)`
    Basic,
    /// `Bearer <token>`
    Bearer,
    /// `Sicas base64(challenge:response)`
    Sicas,
}

impl Scheme {
    pub fn name(&self) -> &'static str {
        match self {
            Scheme::Basic => "Basic",
            Scheme::Bearer => "Bearer",
            Scheme::Sicas => "Sicas",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed contents of one `Authorization` header
///
/// Only the fields belonging to `scheme` are filled in. For Sicas the
/// challenge id is carried in `username` and the response in `password`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub scheme: Scheme,
    pub username: String,
    pub password: Secret,
    pub token: String,
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<Secret>) -> Self {
        Self {
            scheme: Scheme::Basic,
            username: username.into(),
            password: password.into(),
            token: String::new(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            scheme: Scheme::Bearer,
            username: String::new(),
            password: Secret::new(""),
            token: token.into(),
        }
    }

    pub fn sicas(challenge: impl Into<String>, response: impl Into<Secret>) -> Self {
        Self {
            scheme: Scheme::Sicas,
            username: challenge.into(),
            password: response.into(),
            token: String::new(),
        }
    }
}
