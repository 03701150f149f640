//! Configuration system for Bouncer
//!
//! Loads configuration from TOML files.

mod types;

pub use types::*;

use crate::crypto::HashAlgorithm;
use crate::token::SigningAlgorithm;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main Bouncer configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Token issuance and session lifetime
    pub token: TokenConfig,
    /// Capability key lifetime
    pub capability: CapabilityConfig,
    /// One-time password lifetime
    pub onetime: OneTimeConfig,
    /// Collaborator settings
    pub backend: BackendConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Load configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Self::from_raw(raw)
    }

    /// Convert from raw TOML config to validated config
    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            token: raw.token.unwrap_or_default().try_into()?,
            capability: raw.capability.unwrap_or_default().try_into()?,
            onetime: raw.onetime.unwrap_or_default().try_into()?,
            backend: raw.backend.unwrap_or_default().try_into()?,
            logging: raw.logging.unwrap_or_default().try_into()?,
        })
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bouncer")
            .join("config.toml")
    }

    /// Get the default directory document path
    pub fn default_directory_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bouncer")
            .join("directory.json")
    }
}

/// Token configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Algorithm new tokens are signed with
    pub algorithm: SigningAlgorithm,
    /// Idle lifetime of a session secret, renewed on every successful check
    pub expiration: Duration,
    /// Absolute token lifetime, embedded as `exp`
    pub max_session: Duration,
    /// Lifetime of the revalidation code
    pub revalidation: Duration,
    /// Accept and issue `none`-signed tokens
    pub allow_unsigned: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            algorithm: SigningAlgorithm::Hs256,
            expiration: Duration::from_secs(DEFAULT_TOKEN_EXPIRATION),
            max_session: Duration::from_secs(DEFAULT_MAX_SESSION),
            revalidation: Duration::from_secs(DEFAULT_REVALIDATION),
            allow_unsigned: false,
        }
    }
}

/// Capability key configuration
#[derive(Debug, Clone)]
pub struct CapabilityConfig {
    /// Lifetime of a key list, reset whenever keys are added
    pub expiration: Duration,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            expiration: Duration::from_secs(DEFAULT_CAPABILITY_EXPIRATION),
        }
    }
}

/// One-time password configuration
#[derive(Debug, Clone)]
pub struct OneTimeConfig {
    pub expiration: Duration,
    /// `sendmail`-compatible program that delivers passwords; one-time
    /// passwords are disabled without it
    pub sendmail: Option<PathBuf>,
    /// Envelope sender of delivery mails
    pub sender: String,
}

impl Default for OneTimeConfig {
    fn default() -> Self {
        Self {
            expiration: Duration::from_secs(DEFAULT_ONETIME_EXPIRATION),
            sendmail: None,
            sender: DEFAULT_ONETIME_SENDER.to_string(),
        }
    }
}

/// Collaborator configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Upper bound on any single directory or cache call
    pub call_timeout: Duration,
    /// JSON directory document served by `bouncer serve`
    pub directory: PathBuf,
    /// Digest used by `bouncer hash-password`
    pub hash: HashAlgorithm,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            directory: Config::default_directory_path(),
            hash: HashAlgorithm::Sha512,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Format: "json" or "pretty"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format
    Pretty,
    /// JSON format
    Json,
}

/// Default configuration written by `bouncer init`
pub const DEFAULT_CONFIG: &str = r#"# Bouncer configuration

[token]
# none, HS256, HS384 or HS512; anything else signs with HS256
algorithm = "HS256"
# Idle session lifetime in seconds, renewed on every successful check
expiration = 1200
# Absolute token lifetime in seconds
max_session = 28800
revalidation = 86400
allow_unsigned = false

[capability]
expiration = 86400

[onetime]
expiration = 1800
# One-time passwords are mailed to the username through this program
# sendmail = "/usr/sbin/sendmail"
# sender = "noreply@example.org"

[backend]
call_timeout_ms = 2000
# directory = "~/.local/share/bouncer/directory.json"

[logging]
level = "info"
format = "pretty"
"#;
