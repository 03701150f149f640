//! Wire types for the line-delimited JSON server

use crate::Outcome;
use serde::{Deserialize, Serialize};

/// One request line
///
/// ```json
/// {"id": 7, "op": "authorize", "authorization": "Bearer ...", "system": "https://..."}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Echoed back on the reply so callers can pipeline requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(flatten)]
    pub request: Request,
}

/// Operations the server understands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Log in (Basic) or refresh a token (Bearer)
    Authenticate {
        #[serde(default)]
        authorization: Option<String>,
    },
    /// Rights on one system
    Authorize {
        #[serde(default)]
        authorization: Option<String>,
        system: String,
    },
    /// Re-confirm a token with its revalidation code
    Revalidate {
        #[serde(default)]
        authorization: Option<String>,
        code: String,
    },
    Logout {
        #[serde(default)]
        authorization: Option<String>,
    },
    /// Mint capability keys
    Share {
        #[serde(default)]
        authorization: Option<String>,
        systems: Vec<String>,
    },
    /// Revoke one capability key, or all of them when `key` is absent
    Unshare {
        #[serde(default)]
        authorization: Option<String>,
        #[serde(default)]
        key: Option<String>,
    },
    /// Rights a capability key grants on one system
    Redeem { key: String, system: String },
    /// Verify a Sicas challenge response
    Challenge {
        #[serde(default)]
        authorization: Option<String>,
    },
    /// Issue a one-time password
    Onetime { username: String },
}

impl Request {
    pub fn op(&self) -> &'static str {
        match self {
            Request::Authenticate { .. } => "authenticate",
            Request::Authorize { .. } => "authorize",
            Request::Revalidate { .. } => "revalidate",
            Request::Logout { .. } => "logout",
            Request::Share { .. } => "share",
            Request::Unshare { .. } => "unshare",
            Request::Redeem { .. } => "redeem",
            Request::Challenge { .. } => "challenge",
            Request::Onetime { .. } => "onetime",
        }
    }
}

/// One reply line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(flatten)]
    pub outcome: Outcome,
}
