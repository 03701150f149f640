//! Digest computation and secret derivation
//!
//! Password hashes in the directory are hex digests of `password + salt`
//! under a per-user algorithm. Session secrets and capability keys are
//! SHA-1 digests over a stable value mixed with two independent random
//! salts: a jittered timestamp and a random character string.

use chrono::{Duration, SecondsFormat, Utc};
use rand::{rngs::OsRng, Rng};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::str::FromStr;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Alphabet used for character salts
const SALT_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_-0123456789";

/// Length of the character salt mixed into derived secrets
pub const SECRET_SALT_LENGTH: usize = 64;

/// Upper bound (exclusive) of the random minute offset in a time salt
const TIME_SALT_MAX_MINUTES: i64 = 100_000;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown hash algorithm: {0}")]
pub struct UnknownAlgorithm(pub String);

/// Digest algorithms a user record may name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Resolve an algorithm name the way the directory expects.
    ///
    /// Any name other than `sha1`, `sha256` or `sha384` (including a
    /// missing one) resolves to SHA-512. Records written before the
    /// `hash` field existed rely on this.
    pub fn resolve(name: Option<&str>) -> Self {
        name.and_then(|n| n.parse::<HashAlgorithm>().ok())
            .unwrap_or(HashAlgorithm::Sha512)
    }

    /// Hex digest of `content`
    pub fn hash(&self, content: &str) -> String {
        let bytes = content.as_bytes();
        match self {
            HashAlgorithm::Sha1 => hex::encode(Sha1::digest(bytes)),
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
            HashAlgorithm::Sha384 => hex::encode(Sha384::digest(bytes)),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = UnknownAlgorithm;

    /// Strict parse: unknown names are an error
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(UnknownAlgorithm(other.to_string())),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Hash a password with its salt (empty when the record predates salting)
pub fn password_hash(algorithm: HashAlgorithm, password: &str, salt: &str) -> String {
    let mut content = String::with_capacity(password.len() + salt.len());
    content.push_str(password);
    content.push_str(salt);
    algorithm.hash(&content)
}

/// Check a password against a stored hex digest in constant time
pub fn verify_password(
    algorithm: HashAlgorithm,
    password: &str,
    salt: &str,
    stored_hash: &str,
) -> bool {
    constant_time_eq(&password_hash(algorithm, password, salt), stored_hash)
}

/// Compare two strings without short-circuiting on the first difference
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Derive an unpredictable SHA-1 secret from a stable value
pub fn derive_secret(stable: &str) -> String {
    let mut content = String::from(stable);
    content.push_str(&time_salt());
    content.push_str(&char_salt(SECRET_SALT_LENGTH));
    HashAlgorithm::Sha1.hash(&content)
}

/// Current UTC time pushed forward by a random number of minutes,
/// serialized with nanosecond precision and an explicit offset
pub fn time_salt() -> String {
    let offset = OsRng.gen_range(0..TIME_SALT_MAX_MINUTES);
    (Utc::now() + Duration::minutes(offset)).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Random string of `size` characters from `[A-Za-z0-9_-]`
pub fn char_salt(size: usize) -> String {
    (0..size)
        .map(|_| SALT_ALPHABET[OsRng.gen_range(0..SALT_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_names() {
        assert_eq!(HashAlgorithm::resolve(Some("sha1")), HashAlgorithm::Sha1);
        assert_eq!(HashAlgorithm::resolve(Some("sha256")), HashAlgorithm::Sha256);
        assert_eq!(HashAlgorithm::resolve(Some("sha384")), HashAlgorithm::Sha384);
        assert_eq!(HashAlgorithm::resolve(Some("sha512")), HashAlgorithm::Sha512);
    }

    #[test]
    fn test_resolve_defaults_to_sha512() {
        assert_eq!(HashAlgorithm::resolve(None), HashAlgorithm::Sha512);
        assert_eq!(HashAlgorithm::resolve(Some("md5")), HashAlgorithm::Sha512);
        assert_eq!(HashAlgorithm::resolve(Some("SHA1")), HashAlgorithm::Sha512);
        assert_eq!(HashAlgorithm::resolve(Some("")), HashAlgorithm::Sha512);
    }

    #[test]
    fn test_strict_parse_rejects_unknown() {
        assert_eq!(
            "whirlpool".parse::<HashAlgorithm>(),
            Err(UnknownAlgorithm("whirlpool".to_string()))
        );
        assert_eq!("sha384".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha384));
    }

    #[test]
    fn test_known_digests() {
        assert_eq!(
            HashAlgorithm::Sha1.hash("abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            HashAlgorithm::Sha256.hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(HashAlgorithm::Sha384.hash("abc").len(), 96);
        assert_eq!(HashAlgorithm::Sha512.hash("abc").len(), 128);
    }

    #[test]
    fn test_password_verification_with_and_without_salt() {
        let stored = password_hash(HashAlgorithm::Sha256, "hunter2", "pepper");
        assert!(verify_password(HashAlgorithm::Sha256, "hunter2", "pepper", &stored));
        assert!(!verify_password(HashAlgorithm::Sha256, "hunter3", "pepper", &stored));
        assert!(!verify_password(HashAlgorithm::Sha256, "hunter2", "", &stored));

        let unsalted = HashAlgorithm::Sha512.hash("hunter2");
        assert!(verify_password(HashAlgorithm::Sha512, "hunter2", "", &unsalted));
    }

    #[test]
    fn test_char_salt_alphabet_and_length() {
        let salt = char_salt(256);
        assert_eq!(salt.len(), 256);
        assert!(salt
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }

    #[test]
    fn test_time_salt_is_rfc3339_utc() {
        let salt = time_salt();
        assert!(salt.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&salt).is_ok());
    }

    #[test]
    fn test_derived_secrets_are_unique_sha1() {
        let a = derive_secret("stable");
        let b = derive_secret("stable");
        assert_eq!(a.len(), 40);
        assert_ne!(a, b);
    }
}
