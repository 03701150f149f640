//! Authentication and authorization
//!
//! Provides:
//! - `Authorization` header parsing (Basic, Bearer, Sicas)
//! - Challenge/response verification for the Sicas scheme
//! - Out-of-band delivery of one-time passwords
//! - The [`Gatekeeper`] that sequences extraction, validation, issuance
//!   and access matching

mod challenge;
mod delivery;
mod extract;
mod gatekeeper;
mod types;

pub use challenge::{ChallengeError, ChallengeValidator, ChallengeVerdict, MemoryChallengeValidator};
pub use delivery::{DeliveryError, MemoryDelivery, OneTimeDelivery, SendmailDelivery};
pub use extract::parse_authorization;
pub use gatekeeper::Gatekeeper;
pub use types::{Credentials, Scheme};
