//! Cryptographic helpers for bouncer
//!
//! Password digests, constant-time comparison, and derivation of session
//! secrets and capability keys.

mod hash;

pub use hash::{
    char_salt, constant_time_eq, derive_secret, password_hash, time_salt, verify_password,
    HashAlgorithm, UnknownAlgorithm, SECRET_SALT_LENGTH,
};
