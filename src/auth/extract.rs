//! `Authorization` header parsing

use super::types::{Credentials, Scheme};
use crate::AuthError;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine,
};

/// Parse an `Authorization` header into exactly one kind of credentials
pub fn parse_authorization(auth_header: Option<&str>) -> Result<Credentials, AuthError> {
    let header = auth_header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(AuthError::MissingCredentials)?;

    let (keyword, payload) = header
        .split_once(char::is_whitespace)
        .map(|(k, p)| (k, p.trim()))
        .ok_or_else(|| unsupported(header))?;

    let scheme = if keyword.eq_ignore_ascii_case("basic") {
        Scheme::Basic
    } else if keyword.eq_ignore_ascii_case("bearer") {
        Scheme::Bearer
    } else if keyword.eq_ignore_ascii_case("sicas") {
        Scheme::Sicas
    } else {
        return Err(unsupported(keyword));
    };

    match scheme {
        Scheme::Basic => {
            let (username, password) = split_pair(payload)?;
            Ok(Credentials::basic(username.to_lowercase(), password))
        }
        Scheme::Sicas => {
            let (challenge, response) = split_pair(payload)?;
            Ok(Credentials::sicas(challenge, response))
        }
        Scheme::Bearer => {
            if !is_compact_token(payload) {
                return Err(unsupported("Bearer"));
            }
            Ok(Credentials::bearer(payload))
        }
    }
}

fn unsupported(what: &str) -> AuthError {
    let keyword = what.split_whitespace().next().unwrap_or_default();
    AuthError::UnsupportedScheme(keyword.to_string())
}

/// Decode `base64(left:right)`, splitting on the first colon
fn split_pair(payload: &str) -> Result<(String, String), AuthError> {
    let bytes = STANDARD
        .decode(payload)
        .or_else(|_| URL_SAFE.decode(payload))
        .map_err(|_| AuthError::MalformedCredentials("invalid base64 payload".to_string()))?;
    let decoded = String::from_utf8(bytes)
        .map_err(|_| AuthError::MalformedCredentials("payload is not UTF-8".to_string()))?;

    let (left, right) = decoded
        .split_once(':')
        .ok_or_else(|| AuthError::MalformedCredentials("missing ':' separator".to_string()))?;
    if left.is_empty() || right.is_empty() {
        return Err(AuthError::MalformedCredentials(
            "empty username or password".to_string(),
        ));
    }

    Ok((left.to_string(), right.to_string()))
}

/// Three base64url segments; the signature segment may be empty
fn is_compact_token(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, claims, signature] = segments.as_slice() else {
        return false;
    };
    let base64url = |s: &str| {
        s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    };

    !header.is_empty()
        && !claims.is_empty()
        && base64url(header)
        && base64url(claims)
        && base64url(signature)
}
