//! Request orchestration
//!
//! The [`Gatekeeper`] turns an `Authorization` header into a decision:
//! it extracts credentials, validates them (password, one-time password,
//! token or challenge), and then issues a token, matches a system, or
//! mints capability keys. Every collaborator call is bounded by the
//! configured call timeout.
//!
//! Basic auth answers `InvalidPassword` for unknown users and wrong
//! passwords alike, after the same amount of hashing; `AccountDisabled` is
//! only reported to callers that proved the password.

use super::challenge::{ChallengeValidator, ChallengeVerdict};
use super::delivery::OneTimeDelivery;
use super::extract::parse_authorization;
use super::types::{Credentials, Scheme};
use crate::access::{match_system, AccessResolver};
use crate::capability::{list_id, split_compound, CapabilityKey, CapabilityKeyStore};
use crate::config::Config;
use crate::crypto::{constant_time_eq, derive_secret, verify_password, HashAlgorithm};
use crate::directory::{Directory, DirectoryError, TimeoutDirectory, UserRecord};
use crate::storage::{keys, SecretStore, TimeoutStore};
use crate::token::{IssuedToken, TokenClaims, TokenEngine};
use crate::{AccessEntry, AuthError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Stored hash for accounts that cannot match any password
const UNMATCHABLE_HASH: &str = "!";

/// Caller identity established for one request
struct Principal {
    username: String,
    systems: Vec<AccessEntry>,
}

/// Authentication and authorization entry point
pub struct Gatekeeper {
    directory: Arc<dyn Directory>,
    store: Arc<dyn SecretStore>,
    resolver: AccessResolver,
    tokens: TokenEngine,
    capabilities: CapabilityKeyStore,
    challenges: Option<Arc<dyn ChallengeValidator>>,
    delivery: Option<Arc<dyn OneTimeDelivery>>,
    onetime_ttl: Duration,
    call_timeout: Duration,
}

impl Gatekeeper {
    pub fn new(
        config: &Config,
        directory: Arc<dyn Directory>,
        store: Arc<dyn SecretStore>,
    ) -> Self {
        let limit = config.backend.call_timeout;
        let directory: Arc<dyn Directory> = Arc::new(TimeoutDirectory::new(directory, limit));
        let store: Arc<dyn SecretStore> = Arc::new(TimeoutStore::new(store, limit));

        Self {
            resolver: AccessResolver::new(directory.clone()),
            tokens: TokenEngine::new(store.clone(), config.token.clone()),
            capabilities: CapabilityKeyStore::new(store.clone(), config.capability.expiration),
            directory,
            store,
            challenges: None,
            delivery: None,
            onetime_ttl: config.onetime.expiration,
            call_timeout: limit,
        }
    }

    /// Enable the Sicas scheme
    pub fn with_challenge_validator(mut self, validator: Arc<dyn ChallengeValidator>) -> Self {
        self.challenges = Some(validator);
        self
    }

    /// Enable one-time passwords, delivered through `delivery`
    pub fn with_one_time_delivery(mut self, delivery: Arc<dyn OneTimeDelivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn tokens(&self) -> &TokenEngine {
        &self.tokens
    }

    /// Exchange credentials for a fresh token.
    ///
    /// Basic credentials log the user in. A Bearer token is refreshed: the
    /// user must still be active and the access list is resolved again, but
    /// the refreshed token keeps the original login time and so the
    /// original `max_session` ceiling.
    pub async fn authenticate(&self, auth_header: Option<&str>) -> Result<IssuedToken, AuthError> {
        let creds = parse_authorization(auth_header)?;
        let (user, previous) = match creds.scheme {
            Scheme::Basic => (self.valid_basic_auth(&creds).await?, None),
            Scheme::Bearer => {
                let claims = self.tokens.validate(&creds.token).await?;
                let user = match self.directory.get_user(&claims.sub).await {
                    Ok(user) => user,
                    Err(DirectoryError::NotFound(_)) => {
                        return Err(AuthError::InvalidToken("unknown subject".to_string()))
                    }
                    Err(e) => return Err(e.into()),
                };
                if !user.active {
                    return Err(AuthError::AccountDisabled);
                }
                (user, Some(claims))
            }
            Scheme::Sicas => return Err(AuthError::UnsupportedScheme(creds.scheme.to_string())),
        };

        let systems = self.resolver.resolve(&user).await?;
        let stable = user.password.as_deref().unwrap_or_default();
        let issued = match previous {
            None => {
                self.tokens
                    .issue(&user.id, user.uri.clone(), systems, stable)
                    .await?
            }
            Some(previous) => {
                self.tokens
                    .refresh(&previous, user.uri.clone(), systems, stable)
                    .await?
            }
        };

        info!(user = %user.id, scheme = %creds.scheme, "Issued token");
        Ok(issued)
    }

    /// Rights the caller holds on `system`
    pub async fn authorize(
        &self,
        auth_header: Option<&str>,
        system: &str,
    ) -> Result<Value, AuthError> {
        let creds = parse_authorization(auth_header)?;
        let principal = self.identify(&creds).await?;

        match match_system(system, &principal.systems) {
            Some(rights) => {
                debug!(user = %principal.username, system = %system, "Access granted");
                Ok(rights.clone())
            }
            None => {
                debug!(user = %principal.username, system = %system, "No access to system");
                Err(AuthError::Forbidden)
            }
        }
    }

    /// Re-confirm a (possibly expired) token with its revalidation code.
    ///
    /// Sessions of accounts disabled since login are torn down here.
    pub async fn revalidate(
        &self,
        auth_header: Option<&str>,
        code: &str,
    ) -> Result<TokenClaims, AuthError> {
        let creds = parse_authorization(auth_header)?;
        if creds.scheme != Scheme::Bearer {
            return Err(AuthError::UnsupportedScheme(creds.scheme.to_string()));
        }
        let claims = self.tokens.revalidate(&creds.token, code).await?;

        let active = match self.directory.get_user(&claims.sub).await {
            Ok(user) => user.active,
            Err(DirectoryError::NotFound(_)) => false,
            Err(e) => return Err(e.into()),
        };
        if !active {
            self.tokens.revoke(&claims.sub).await?;
            info!(user = %claims.sub, "Revoked session of disabled account");
            return Err(AuthError::AccountDisabled);
        }

        self.touch(&claims.sub).await;
        Ok(claims)
    }

    /// End every session of the caller
    pub async fn logout(&self, auth_header: Option<&str>) -> Result<(), AuthError> {
        let creds = parse_authorization(auth_header)?;
        let username = match creds.scheme {
            Scheme::Basic => self.valid_basic_auth(&creds).await?.id,
            Scheme::Bearer => self.tokens.validate(&creds.token).await?.sub,
            Scheme::Sicas => return Err(AuthError::UnsupportedScheme(creds.scheme.to_string())),
        };

        self.tokens.revoke(&username).await?;
        info!(user = %username, "Logged out");
        Ok(())
    }

    /// Mint read-only capability keys for systems the caller can access
    pub async fn share(
        &self,
        auth_header: Option<&str>,
        systems: &[String],
    ) -> Result<Vec<CapabilityKey>, AuthError> {
        let creds = parse_authorization(auth_header)?;
        let principal = self.identify(&creds).await?;
        if systems.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(denied) = systems
            .iter()
            .find(|system| match_system(system, &principal.systems).is_none())
        {
            debug!(user = %principal.username, system = %denied, "Refusing to share inaccessible system");
            return Err(AuthError::Forbidden);
        }

        self.capabilities.mint(&principal.username, systems).await
    }

    /// Revoke one of the caller's capability keys, or all of them
    pub async fn unshare(
        &self,
        auth_header: Option<&str>,
        compound: Option<&str>,
    ) -> Result<(), AuthError> {
        let creds = parse_authorization(auth_header)?;
        let principal = self.identify(&creds).await?;

        let Some(compound) = compound else {
            return self.capabilities.revoke_all(&principal.username).await;
        };
        let (id, key) = split_compound(compound)?;
        if id != list_id(&principal.username) {
            return Err(AuthError::Forbidden);
        }
        self.capabilities.revoke_key(id, key).await
    }

    /// Rights a capability key grants on `system`
    pub async fn redeem(&self, compound: &str, system: &str) -> Result<Value, AuthError> {
        self.capabilities.redeem(compound, system).await
    }

    /// Check a Sicas challenge response
    pub async fn verify_challenge(
        &self,
        auth_header: Option<&str>,
    ) -> Result<ChallengeVerdict, AuthError> {
        let creds = parse_authorization(auth_header)?;
        if creds.scheme != Scheme::Sicas {
            return Err(AuthError::UnsupportedScheme(creds.scheme.to_string()));
        }
        let Some(validator) = &self.challenges else {
            warn!("Sicas credentials presented but no challenge validator is configured");
            return Err(AuthError::InvalidPassword);
        };

        let verdict = tokio::time::timeout(
            self.call_timeout,
            validator.validate(&creds.username, creds.password.expose()),
        )
        .await
        .map_err(|_| {
            AuthError::Internal(format!(
                "challenge service timed out after {:?}",
                self.call_timeout
            ))
        })??;

        if verdict.success {
            Ok(verdict)
        } else {
            debug!(challenge = %creds.username, reason = %verdict.reason, "Challenge rejected");
            Err(AuthError::InvalidPassword)
        }
    }

    /// Cache a single-use password for `username` and send it to the
    /// account owner. The password is never returned.
    pub async fn issue_one_time_password(&self, username: &str) -> Result<(), AuthError> {
        let username = username.trim().to_lowercase();
        if username.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let Some(delivery) = &self.delivery else {
            warn!(user = %username, "One-time password requested but no delivery is configured");
            return Err(AuthError::Internal(
                "one-time password delivery is not configured".to_string(),
            ));
        };

        let key = keys::one_time(&username);
        let password = derive_secret(&username);
        self.store.put(&key, &password, self.onetime_ttl).await?;

        let delivered =
            tokio::time::timeout(self.call_timeout, delivery.deliver(&username, &password))
                .await
                .map_err(|_| {
                    AuthError::Internal(format!(
                        "one-time delivery timed out after {:?}",
                        self.call_timeout
                    ))
                })
                .and_then(|result| result.map_err(AuthError::from));
        if let Err(e) = delivered {
            self.store.delete(&key).await?;
            return Err(e);
        }

        info!(user = %username, "Issued one-time password");
        Ok(())
    }

    async fn identify(&self, creds: &Credentials) -> Result<Principal, AuthError> {
        match creds.scheme {
            Scheme::Basic => {
                let user = self.valid_basic_auth(creds).await?;
                let systems = self.resolver.resolve(&user).await?;
                Ok(Principal {
                    username: user.id,
                    systems,
                })
            }
            Scheme::Bearer => {
                let claims = self.tokens.validate(&creds.token).await?;
                self.touch(&claims.sub).await;
                Ok(Principal {
                    username: claims.sub,
                    systems: claims.systems,
                })
            }
            Scheme::Sicas => Err(AuthError::UnsupportedScheme(creds.scheme.to_string())),
        }
    }

    /// Check Basic credentials, falling back to a cached one-time password
    async fn valid_basic_auth(&self, creds: &Credentials) -> Result<UserRecord, AuthError> {
        let user = match self.directory.get_user(&creds.username).await {
            Ok(user) => Some(user),
            Err(DirectoryError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        // Unknown and password-less accounts still compute one digest,
        // compared against a value no digest produces.
        let password = creds.password.expose();
        let (algorithm, salt, stored) = match &user {
            Some(user) => (
                HashAlgorithm::resolve(user.hash.as_deref()),
                user.salt(),
                user.password.as_deref().unwrap_or(UNMATCHABLE_HASH),
            ),
            None => (HashAlgorithm::resolve(None), "", UNMATCHABLE_HASH),
        };
        let mut valid = verify_password(algorithm, password, salt, stored);

        let key = keys::one_time(
            user.as_ref()
                .map_or(creds.username.as_str(), |user| user.id.as_str()),
        );
        let mut one_time_used = false;
        if !valid {
            if let Some(one_time) = self.store.get(&key).await? {
                one_time_used = constant_time_eq(&one_time, password);
                valid = one_time_used;
            }
        }

        let Some(user) = user.filter(|_| valid) else {
            debug!(user = %creds.username, "Unknown user or password mismatch");
            return Err(AuthError::InvalidPassword);
        };
        if !user.active {
            return Err(AuthError::AccountDisabled);
        }
        if one_time_used {
            self.store.delete(&key).await?;
            info!(user = %user.id, "Accepted one-time password");
        }
        Ok(user)
    }

    async fn touch(&self, username: &str) {
        match self.tokens.touch(username).await {
            Ok(true) => {}
            Ok(false) => warn!(user = %username, "Session secret gone before it could be extended"),
            Err(e) => warn!(user = %username, error = %e, "Failed to extend session"),
        }
    }
}
