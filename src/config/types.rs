//! Raw configuration types for TOML parsing

use super::*;
use crate::storage::MAX_TTL;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_TOKEN_EXPIRATION: u64 = 1200;
pub const DEFAULT_MAX_SESSION: u64 = 8 * 60 * 60;
pub const DEFAULT_REVALIDATION: u64 = 24 * 60 * 60;
pub const DEFAULT_CAPABILITY_EXPIRATION: u64 = 24 * 60 * 60;
pub const DEFAULT_ONETIME_EXPIRATION: u64 = 1800;
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_ONETIME_SENDER: &str = "noreply@localhost";

/// Read a lifetime in seconds, refusing values the cache cannot hold
fn lifetime(field: &str, value: Option<u64>, default: u64) -> Result<Duration, ConfigError> {
    let secs = value.unwrap_or(default);
    if secs > MAX_TTL.as_secs() {
        return Err(ConfigError::Invalid(format!(
            "{} must be at most {} seconds",
            field,
            MAX_TTL.as_secs()
        )));
    }
    Ok(Duration::from_secs(secs))
}

/// Raw configuration as parsed from TOML
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub token: Option<RawTokenConfig>,
    pub capability: Option<RawCapabilityConfig>,
    pub onetime: Option<RawOneTimeConfig>,
    pub backend: Option<RawBackendConfig>,
    pub logging: Option<RawLoggingConfig>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawTokenConfig {
    pub algorithm: Option<String>,
    pub expiration: Option<u64>,
    pub max_session: Option<u64>,
    pub revalidation: Option<u64>,
    pub allow_unsigned: Option<bool>,
}

impl TryFrom<RawTokenConfig> for TokenConfig {
    type Error = ConfigError;

    fn try_from(raw: RawTokenConfig) -> Result<Self, Self::Error> {
        let algorithm = match raw.algorithm.as_deref() {
            None => SigningAlgorithm::Hs256,
            Some(name) => {
                let algorithm = SigningAlgorithm::resolve(name);
                if name.parse::<SigningAlgorithm>().is_err() {
                    warn!(algorithm = %name, "Unknown signing algorithm; using {}", algorithm);
                }
                algorithm
            }
        };

        Ok(Self {
            algorithm,
            expiration: lifetime("token.expiration", raw.expiration, DEFAULT_TOKEN_EXPIRATION)?,
            max_session: lifetime("token.max_session", raw.max_session, DEFAULT_MAX_SESSION)?,
            revalidation: lifetime("token.revalidation", raw.revalidation, DEFAULT_REVALIDATION)?,
            allow_unsigned: raw.allow_unsigned.unwrap_or(false),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawCapabilityConfig {
    pub expiration: Option<u64>,
}

impl TryFrom<RawCapabilityConfig> for CapabilityConfig {
    type Error = ConfigError;

    fn try_from(raw: RawCapabilityConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            expiration: lifetime(
                "capability.expiration",
                raw.expiration,
                DEFAULT_CAPABILITY_EXPIRATION,
            )?,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawOneTimeConfig {
    pub expiration: Option<u64>,
    pub sendmail: Option<String>,
    pub sender: Option<String>,
}

impl TryFrom<RawOneTimeConfig> for OneTimeConfig {
    type Error = ConfigError;

    fn try_from(raw: RawOneTimeConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            expiration: lifetime("onetime.expiration", raw.expiration, DEFAULT_ONETIME_EXPIRATION)?,
            sendmail: raw.sendmail.map(PathBuf::from),
            sender: raw
                .sender
                .unwrap_or_else(|| DEFAULT_ONETIME_SENDER.to_string()),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawBackendConfig {
    pub call_timeout_ms: Option<u64>,
    pub directory: Option<String>,
    pub hash: Option<String>,
}

impl TryFrom<RawBackendConfig> for BackendConfig {
    type Error = ConfigError;

    fn try_from(raw: RawBackendConfig) -> Result<Self, Self::Error> {
        let call_timeout_ms = raw.call_timeout_ms.unwrap_or(DEFAULT_CALL_TIMEOUT_MS);
        if call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "call_timeout_ms must be greater than zero".to_string(),
            ));
        }

        let hash: HashAlgorithm = match raw.hash.as_deref() {
            None => HashAlgorithm::Sha512,
            Some(name) => name
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("Unknown hash algorithm: {}", name)))?,
        };

        let directory = raw
            .directory
            .map(|p| {
                // Expand ~ to home directory
                if let Some(rest) = p.strip_prefix("~/") {
                    dirs::home_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join(rest)
                } else {
                    PathBuf::from(p)
                }
            })
            .unwrap_or_else(Config::default_directory_path);

        Ok(Self {
            call_timeout: Duration::from_millis(call_timeout_ms),
            directory,
            hash,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl TryFrom<RawLoggingConfig> for LoggingConfig {
    type Error = ConfigError;

    fn try_from(raw: RawLoggingConfig) -> Result<Self, Self::Error> {
        let format = match raw.format.as_deref() {
            Some("pretty") | None => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown log format: {}",
                    other
                )))
            }
        };

        Ok(Self {
            level: raw.level.unwrap_or_else(|| "info".to_string()),
            format,
        })
    }
}
